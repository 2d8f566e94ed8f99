//! SOCKS5 reply builder
//!
//! [`ResponseWriter`] owns the control stream once a connection has been
//! accepted and is the only thing that writes protocol messages to it.

use crate::error::ReplyCode;
use crate::socks::addr::AddrSpec;
use crate::socks::consts::*;
use crate::socks::stream::ProxyStream;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;

/// Encode a reply message
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// A missing address is encoded as IPv4 `0.0.0.0:0`.
pub fn encode_reply(code: ReplyCode, addr: Option<&AddrSpec>) -> BytesMut {
    let unspecified = AddrSpec::unspecified();
    let addr = addr.unwrap_or(&unspecified);

    let mut buf = BytesMut::with_capacity(3 + addr.encoded_len());
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(code.into());
    buf.put_u8(SOCKS5_RESERVED);
    addr.write_to_buf(&mut buf);
    buf
}

/// Writes protocol messages to the client's control stream
pub struct ResponseWriter {
    stream: Box<dyn ProxyStream>,
}

impl ResponseWriter {
    /// Take ownership of the control stream
    pub fn new(stream: Box<dyn ProxyStream>) -> Self {
        ResponseWriter { stream }
    }

    async fn write_msg(&mut self, msg: &[u8]) -> io::Result<()> {
        self.stream.write_all(msg).await?;
        self.stream.flush().await
    }

    /// Acknowledge the selected authentication method
    pub async fn send_method(&mut self, method: u8) -> io::Result<()> {
        self.write_msg(&[SOCKS5_VERSION, method]).await
    }

    /// Tell the client none of its methods are acceptable
    pub async fn send_no_acceptable_auth(&mut self) -> io::Result<()> {
        self.send_method(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE).await
    }

    /// Send the username/password sub-negotiation status
    ///
    /// ```text
    /// +----+--------+
    /// |VER | STATUS |
    /// +----+--------+
    /// | 1  |   1    |
    /// +----+--------+
    /// ```
    pub async fn send_auth_status(&mut self, success: bool) -> io::Result<()> {
        let status = if success {
            SOCKS5_AUTH_SUCCESS
        } else {
            SOCKS5_AUTH_FAILURE
        };
        self.write_msg(&[SOCKS5_AUTH_VERSION, status]).await
    }

    /// Send a reply with an optional bound address
    pub async fn send_reply(&mut self, code: ReplyCode, addr: Option<&AddrSpec>) -> io::Result<()> {
        let reply = encode_reply(code, addr);
        self.write_msg(&reply).await
    }

    /// Send a success reply carrying the locally bound address
    pub async fn send_succeeded(&mut self, bound: SocketAddr) -> io::Result<()> {
        self.send_reply(ReplyCode::Succeeded, Some(&AddrSpec::Ip(bound)))
            .await
    }

    /// Build a "general failure" reply
    pub async fn send_general_failure(&mut self) -> io::Result<()> {
        self.send_reply(ReplyCode::GeneralFailure, None).await
    }

    /// Build a "command not supported" reply
    pub async fn send_command_not_supported(&mut self) -> io::Result<()> {
        self.send_reply(ReplyCode::CommandNotSupported, None).await
    }

    /// Build an "address type not supported" reply
    pub async fn send_address_type_not_supported(&mut self) -> io::Result<()> {
        self.send_reply(ReplyCode::AddressTypeNotSupported, None)
            .await
    }

    /// Reply to a failed dial, picking the code from the error text
    pub async fn send_network_error(
        &mut self,
        err: &(dyn fmt::Display + Sync),
    ) -> io::Result<ReplyCode> {
        let code = ReplyCode::from_network_error(err);
        self.send_reply(code, None).await?;
        Ok(code)
    }

    /// Borrow the control stream
    pub fn stream_mut(&mut self) -> &mut Box<dyn ProxyStream> {
        &mut self.stream
    }

    /// Give the control stream back
    pub fn into_inner(self) -> Box<dyn ProxyStream> {
        self.stream
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("stream", &self.stream)
            .finish()
    }
}
