//! SOCKS5 address codec
//!
//! Two views of the same record:
//!
//! * [`AddrSpec`] is the decoded destination used by request handling.
//! * [`WireAddr`] keeps the raw `ATYP | ADDR | PORT` bytes, which is what the
//!   UDP relay prepends to every datagram it sends back to a client.
//!
//! ```text
//! +------+----------+----------+
//! | ATYP |   ADDR   |   PORT   |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```

use super::consts::*;
use crate::error::SocksError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Destination address of a request or datagram
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddrSpec {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Fqdn(String, u16),
}

impl AddrSpec {
    /// Build a domain address, rejecting names that do not fit the length byte
    pub fn fqdn(name: impl Into<String>, port: u16) -> Result<Self, SocksError> {
        let name = name.into();
        if name.len() > MAX_DOMAIN_LEN {
            return Err(SocksError::InvalidAddress(format!(
                "domain name too long: {} bytes",
                name.len()
            )));
        }
        Ok(AddrSpec::Fqdn(name, port))
    }

    /// The all-zero IPv4 address used when a reply carries no address
    pub fn unspecified() -> Self {
        AddrSpec::Ip(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
    }

    /// Read an address (type byte included) from the control stream
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        let atyp = reader.read_u8().await?;
        Self::read_body(reader, atyp).await
    }

    /// Read the address body once the type byte has already been consumed
    pub async fn read_body<R>(reader: &mut R, atyp: u8) -> Result<Self, SocksError>
    where
        R: AsyncRead + Unpin,
    {
        match atyp {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut ip = [0u8; 4];
                reader.read_exact(&mut ip).await?;
                let port = reader.read_u16().await?;
                Ok(AddrSpec::Ip(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(ip),
                    port,
                ))))
            }
            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut ip = [0u8; 16];
                reader.read_exact(&mut ip).await?;
                let port = reader.read_u16().await?;
                Ok(AddrSpec::Ip(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(ip),
                    port,
                    0,
                    0,
                ))))
            }
            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = reader.read_u8().await? as usize;
                let mut name = vec![0u8; len];
                reader.read_exact(&mut name).await?;
                let port = reader.read_u16().await?;
                let name = String::from_utf8(name).map_err(|_| {
                    SocksError::InvalidAddress("domain name is not valid UTF-8".to_string())
                })?;
                Ok(AddrSpec::Fqdn(name, port))
            }
            other => Err(SocksError::AddressTypeNotSupported(other)),
        }
    }

    /// Decode an address from the front of `buf`
    ///
    /// Returns the address and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), SocksError> {
        let used = wire_len(buf)?;
        let port = u16::from_be_bytes([buf[used - 2], buf[used - 1]]);

        let addr = match buf[0] {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let ip: [u8; 4] = [buf[1], buf[2], buf[3], buf[4]];
                AddrSpec::Ip(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(ip), port)))
            }
            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut ip = [0u8; 16];
                ip.copy_from_slice(&buf[1..17]);
                AddrSpec::Ip(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(ip),
                    port,
                    0,
                    0,
                )))
            }
            _ => {
                let name = std::str::from_utf8(&buf[2..used - 2]).map_err(|_| {
                    SocksError::InvalidAddress("domain name is not valid UTF-8".to_string())
                })?;
                AddrSpec::Fqdn(name.to_string(), port)
            }
        };

        Ok((addr, used))
    }

    /// Address type byte for this address
    pub fn addr_type(&self) -> u8 {
        match self {
            AddrSpec::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            AddrSpec::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            AddrSpec::Fqdn(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Number of bytes [`write_to_buf`](Self::write_to_buf) appends
    pub fn encoded_len(&self) -> usize {
        match self {
            AddrSpec::Ip(SocketAddr::V4(_)) => 1 + 4 + 2,
            AddrSpec::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            AddrSpec::Fqdn(name, _) => 1 + 1 + name.len().min(MAX_DOMAIN_LEN) + 2,
        }
    }

    /// Append the wire encoding to `buf`
    pub fn write_to_buf(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.addr_type());
        match self {
            AddrSpec::Ip(SocketAddr::V4(addr)) => {
                buf.put_slice(&addr.ip().octets());
            }
            AddrSpec::Ip(SocketAddr::V6(addr)) => {
                buf.put_slice(&addr.ip().octets());
            }
            AddrSpec::Fqdn(name, _) => {
                let name = &name.as_bytes()[..name.len().min(MAX_DOMAIN_LEN)];
                buf.put_u8(name.len() as u8);
                buf.put_slice(name);
            }
        }
        buf.put_u16(self.port());
    }

    /// Wire encoding as an owned buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to_buf(&mut buf);
        buf.freeze()
    }

    /// Host part: the IP (unbracketed) or the domain name
    pub fn host(&self) -> String {
        match self {
            AddrSpec::Ip(addr) => addr.ip().to_string(),
            AddrSpec::Fqdn(name, _) => name.clone(),
        }
    }

    /// Port number
    pub fn port(&self) -> u16 {
        match self {
            AddrSpec::Ip(addr) => addr.port(),
            AddrSpec::Fqdn(_, port) => *port,
        }
    }

    /// Dialable "host:port" form, IPv6 bracketed
    pub fn address(&self) -> String {
        self.to_string()
    }

    /// Resolve to a socket address, performing a DNS lookup for domains
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        match self {
            AddrSpec::Ip(addr) => Ok(*addr),
            AddrSpec::Fqdn(name, port) => tokio::net::lookup_host((name.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for {}", name),
                    )
                }),
        }
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpec::Ip(addr) => write!(f, "{}", addr),
            AddrSpec::Fqdn(name, port) => write!(f, "{}:{}", name, port),
        }
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::Ip(addr)
    }
}

impl Default for AddrSpec {
    fn default() -> Self {
        AddrSpec::unspecified()
    }
}

/// Length of the address record at the front of `buf`
fn wire_len(buf: &[u8]) -> Result<usize, SocksError> {
    let atyp = *buf.first().ok_or(SocksError::TruncatedAddress { need: 1, got: 0 })?;

    let need = match atyp {
        SOCKS5_ADDR_TYPE_IPV4 => 1 + 4 + 2,
        SOCKS5_ADDR_TYPE_IPV6 => 1 + 16 + 2,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = *buf.get(1).ok_or(SocksError::TruncatedAddress {
                need: 2,
                got: buf.len(),
            })?;
            1 + 1 + len as usize + 2
        }
        other => return Err(SocksError::AddressTypeNotSupported(other)),
    };

    if buf.len() < need {
        return Err(SocksError::TruncatedAddress {
            need,
            got: buf.len(),
        });
    }

    Ok(need)
}

/// Slice the address record off the front of `buf`
///
/// Returns `None` when the type byte is unknown or the buffer is shorter
/// than the type demands.
pub fn split_addr(buf: &[u8]) -> Option<&[u8]> {
    wire_len(buf).ok().map(|n| &buf[..n])
}

/// Encode a "host:port" string as a wire address
///
/// Numeric hosts become IPv4/IPv6 records; anything else is treated as a
/// domain name. An IPv6 host must be bracketed, and the port must be plain
/// decimal digits.
pub fn parse_addr(s: &str) -> Result<WireAddr, SocksError> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| SocksError::InvalidAddress(format!("missing port in {:?}", s)))?;

    // u16::from_str alone would take a leading '+'
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SocksError::InvalidAddress(format!("invalid port in {:?}", s)));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| SocksError::InvalidAddress(format!("invalid port in {:?}", s)))?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| SocksError::InvalidAddress(format!("missing ']' in {:?}", s)))?,
        None if host.contains(':') || host.contains(']') => {
            return Err(SocksError::InvalidAddress(format!(
                "too many colons in {:?}",
                s
            )));
        }
        None => host,
    };

    let spec = match host.parse::<IpAddr>() {
        Ok(ip) => AddrSpec::Ip(SocketAddr::new(ip, port)),
        Err(_) => AddrSpec::fqdn(host, port)?,
    };

    Ok(WireAddr(spec.to_bytes()))
}

/// Raw encoded address record
///
/// Always holds exactly one well-formed record.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WireAddr(Bytes);

impl WireAddr {
    /// Copy the address record at the front of `buf`
    pub fn split(buf: &[u8]) -> Result<Self, SocksError> {
        let n = wire_len(buf)?;
        Ok(WireAddr(Bytes::copy_from_slice(&buf[..n])))
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a well-formed record
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into an [`AddrSpec`]
    pub fn to_addr_spec(&self) -> Result<AddrSpec, SocksError> {
        AddrSpec::decode(&self.0).map(|(addr, _)| addr)
    }
}

impl fmt::Display for WireAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_addr_spec() {
            Ok(addr) => write!(f, "{}", addr),
            Err(_) => write!(f, "<invalid address>"),
        }
    }
}

impl fmt::Debug for WireAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireAddr({})", self)
    }
}

impl From<SocketAddr> for WireAddr {
    fn from(addr: SocketAddr) -> Self {
        WireAddr(AddrSpec::Ip(addr).to_bytes())
    }
}

impl From<&AddrSpec> for WireAddr {
    fn from(addr: &AddrSpec) -> Self {
        WireAddr(addr.to_bytes())
    }
}
