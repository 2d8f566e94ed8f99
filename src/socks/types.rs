//! SOCKS5 type definitions
//!
//! Command codes and the authenticated identity carried by a request.

use super::consts::*;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    ///
    /// BIND (0x02) and anything unknown yield `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Opaque value produced by an authenticator
///
/// The core never looks inside; command handlers recover the concrete type
/// with [`downcast_ref`](Identity::downcast_ref).
#[derive(Clone, Default)]
pub struct Identity(Option<Arc<dyn Any + Send + Sync>>);

impl Identity {
    /// No identity, as produced by the no-auth method
    pub fn anonymous() -> Self {
        Identity(None)
    }

    /// Wrap an arbitrary value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Identity(Some(Arc::new(value)))
    }

    /// Whether no value is attached
    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the attached value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.downcast_ref::<String>() {
            Some(name) => write!(f, "Identity({:?})", name),
            None if self.is_anonymous() => write!(f, "Identity(anonymous)"),
            None => write!(f, "Identity(..)"),
        }
    }
}
