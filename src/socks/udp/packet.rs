//! SOCKS5 UDP datagram framing
//!
//! # UDP Request Header
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```
//!
//! FRAG is ignored: a fragment is relayed as an ordinary datagram.

use crate::error::SocksError;
use crate::socks::addr::WireAddr;
use crate::socks::consts::UDP_HEADER_LEN;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Strip the header in place
///
/// On success the payload has been moved to the front of `buf`; returns its
/// length and the embedded destination.
pub fn decapsulate(buf: &mut [u8]) -> Result<(usize, WireAddr), SocksError> {
    let n = buf.len();
    if n < UDP_HEADER_LEN {
        return Err(SocksError::PacketTooShort(n));
    }

    let addr = WireAddr::split(&buf[UDP_HEADER_LEN..])?;
    let start = UDP_HEADER_LEN + addr.len();
    buf.copy_within(start..n, 0);

    Ok((n - start, addr))
}

/// Append a framed datagram to `out`
pub fn encapsulate(out: &mut BytesMut, addr: &WireAddr, payload: &[u8]) {
    out.reserve(UDP_HEADER_LEN + addr.len() + payload.len());
    out.put_slice(&[0, 0, 0]);
    out.put_slice(addr.as_bytes());
    out.put_slice(payload);
}

/// Client-facing side of a UDP association
///
/// Wraps the association socket. Reading remembers the first client endpoint
/// and destination seen; writing frames payloads back toward that client.
#[derive(Debug)]
pub struct PacketConn {
    socket: Arc<UdpSocket>,
    /// Client endpoint replies go to
    write_to: Option<SocketAddr>,
    /// Destination used when a reply has no explicit source
    target: Option<WireAddr>,
    /// Last encoded reply source, reused while it stays the same
    reply_cache: Option<(SocketAddr, WireAddr)>,
    scratch: BytesMut,
}

impl PacketConn {
    /// Wrap a socket with nothing remembered yet
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        PacketConn {
            socket,
            write_to: None,
            target: None,
            reply_cache: None,
            scratch: BytesMut::new(),
        }
    }

    /// Wrap a socket with a fixed client endpoint and default destination
    pub fn with_peer(socket: Arc<UdpSocket>, write_to: SocketAddr, target: WireAddr) -> Self {
        PacketConn {
            write_to: Some(write_to),
            target: Some(target),
            ..Self::new(socket)
        }
    }

    /// Receive one framed datagram into `buf`
    ///
    /// Returns the payload length (payload now at the front of `buf`), the
    /// sender and the embedded destination. A malformed datagram is consumed
    /// and reported as an error.
    pub async fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddr, WireAddr), SocksError> {
        let (n, src) = self.socket.recv_from(buf).await?;
        let (len, dst) = decapsulate(&mut buf[..n])?;

        if self.write_to.is_none() {
            self.write_to = Some(src);
        }
        if self.target.is_none() {
            self.target = Some(dst.clone());
        }

        Ok((len, src, dst))
    }

    /// Frame `payload` and send it to the client
    ///
    /// The header carries `from` when given, otherwise the remembered
    /// destination. Returns the number of payload bytes written.
    pub async fn send_to(
        &mut self,
        payload: &[u8],
        from: Option<SocketAddr>,
    ) -> Result<usize, SocksError> {
        let write_to = self
            .write_to
            .ok_or_else(|| SocksError::InvalidAddress("no client endpoint".to_string()))?;

        let addr = match from {
            Some(from) => self.reply_addr(from),
            None => self
                .target
                .clone()
                .ok_or_else(|| SocksError::InvalidAddress("no target address".to_string()))?,
        };

        self.scratch.clear();
        encapsulate(&mut self.scratch, &addr, payload);

        let sent = self.socket.send_to(&self.scratch, write_to).await?;
        Ok(sent.saturating_sub(UDP_HEADER_LEN + addr.len()))
    }

    fn reply_addr(&mut self, from: SocketAddr) -> WireAddr {
        match &self.reply_cache {
            Some((cached, addr)) if *cached == from => addr.clone(),
            _ => {
                let addr = WireAddr::from(from);
                self.reply_cache = Some((from, addr.clone()));
                addr
            }
        }
    }

    /// Remembered client endpoint
    pub fn write_to(&self) -> Option<SocketAddr> {
        self.write_to
    }

    /// Remembered destination
    pub fn target(&self) -> Option<&WireAddr> {
        self.target.as_ref()
    }

    /// Local address of the association socket
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
