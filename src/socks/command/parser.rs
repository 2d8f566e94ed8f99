//! SOCKS5 handshake and request parser
//!
//! Reads the client's greeting and the post-auth request off the control
//! stream. Reads are exact and unbuffered so nothing past the request is
//! consumed.

use crate::error::SocksError;
use crate::socks::addr::AddrSpec;
use crate::socks::consts::*;
use crate::socks::types::{Identity, SocksCommand};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read the greeting version byte, failing on anything but 5
pub async fn read_version<R>(reader: &mut R) -> Result<u8, SocksError>
where
    R: AsyncRead + Unpin,
{
    let version = reader.read_u8().await?;
    if version != SOCKS5_VERSION {
        return Err(SocksError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Read the offered method list
///
/// ```text
/// +----------+----------+
/// | NMETHODS | METHODS  |
/// +----------+----------+
/// |    1     | 1 to 255 |
/// +----------+----------+
/// ```
pub async fn read_methods<R>(reader: &mut R) -> Result<Vec<u8>, SocksError>
where
    R: AsyncRead + Unpin,
{
    let count = reader.read_u8().await? as usize;
    let mut methods = vec![0u8; count];
    reader.read_exact(&mut methods).await?;
    Ok(methods)
}

/// A parsed client request
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// Protocol version from the request header
    pub version: u8,
    /// Raw command byte
    pub command: u8,
    /// Destination address
    pub dest: AddrSpec,
    /// Server side of the control connection
    pub local_addr: Option<SocketAddr>,
    /// Client side of the control connection
    pub remote_addr: Option<SocketAddr>,
    /// Value produced by the authenticator
    pub identity: Identity,
}

impl Request {
    /// Read a request header and destination from the stream
    ///
    /// The version byte is returned as read; the orchestrator checks it.
    /// Endpoint metadata and identity are attached afterwards.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await?;

        let version = header[0];
        let command = header[1];
        let _reserved = header[2];
        let dest = AddrSpec::read_body(reader, header[3]).await?;

        Ok(Request {
            version,
            command,
            dest,
            local_addr: None,
            remote_addr: None,
            identity: Identity::anonymous(),
        })
    }

    /// Decoded command, if the byte is a known one
    pub fn command(&self) -> Option<SocksCommand> {
        SocksCommand::from_byte(self.command)
    }
}
