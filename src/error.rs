//! Error types for socksd
//!
//! Protocol-level failures are typed with [`SocksError`]; orchestration code
//! wraps them in `anyhow::Error`, so callers can still `downcast_ref` to
//! inspect what went wrong on a connection.

use std::fmt;
use std::io;
use thiserror::Error;

/// Coarse classification of a [`SocksError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad version, unknown address type, malformed framing
    Protocol,
    /// Dial/bind/read/write failure
    Network,
    /// No acceptable method or credential mismatch
    Auth,
    /// Buffer or socket allocation failure
    Resource,
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum SocksError {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Unsupported username/password sub-negotiation version
    #[error("Unsupported auth version: {0}")]
    UnsupportedAuthVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Authentication failed
    #[error("Authentication failed")]
    AuthFailed,

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Buffer ends before the embedded address does
    #[error("Truncated address: need {need} bytes, got {got}")]
    TruncatedAddress {
        /// Bytes the address type demands
        need: usize,
        /// Bytes actually available
        got: usize,
    },

    /// Datagram shorter than the fixed UDP header
    #[error("UDP packet too short: {0} bytes")]
    PacketTooShort(usize),

    /// Underlying IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SocksError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SocksError::UnsupportedVersion(_)
            | SocksError::UnsupportedAuthVersion(_)
            | SocksError::AddressTypeNotSupported(_)
            | SocksError::InvalidAddress(_)
            | SocksError::TruncatedAddress { .. }
            | SocksError::PacketTooShort(_) => ErrorKind::Protocol,
            SocksError::NoAcceptableMethod | SocksError::AuthFailed => ErrorKind::Auth,
            SocksError::Io(e) if e.kind() == io::ErrorKind::OutOfMemory => ErrorKind::Resource,
            SocksError::Io(_) => ErrorKind::Network,
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Pick a reply code for a failed dial from the error's text.
    ///
    /// "refused" maps to ConnectionRefused, "network is unreachable" to
    /// NetworkUnreachable, anything else to HostUnreachable. Matching ignores
    /// case since platform messages differ in capitalization.
    pub fn from_network_error(err: &dyn fmt::Display) -> Self {
        let msg = err.to_string().to_lowercase();

        if msg.contains("refused") {
            ReplyCode::ConnectionRefused
        } else if msg.contains("network is unreachable") {
            ReplyCode::NetworkUnreachable
        } else {
            ReplyCode::HostUnreachable
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            other => Err(SocksError::InvalidAddress(format!(
                "unknown reply code: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_from_u8_valid() {
        for code in 0x00..=0x08u8 {
            let parsed = ReplyCode::try_from(code).unwrap();
            assert_eq!(u8::from(parsed), code);
        }
    }

    #[test]
    fn test_reply_code_from_u8_invalid() {
        assert!(ReplyCode::try_from(0x09).is_err());
        assert!(ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_network_error_heuristic_refused() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connect: connection refused");
        assert_eq!(
            ReplyCode::from_network_error(&err),
            ReplyCode::ConnectionRefused
        );

        // OS-formatted message as produced on Linux
        let err = io::Error::from_raw_os_error(111);
        if err.to_string().to_lowercase().contains("refused") {
            assert_eq!(
                ReplyCode::from_network_error(&err),
                ReplyCode::ConnectionRefused
            );
        }
    }

    #[test]
    fn test_network_error_heuristic_network_unreachable() {
        let err = io::Error::new(io::ErrorKind::Other, "connect: network is unreachable");
        assert_eq!(
            ReplyCode::from_network_error(&err),
            ReplyCode::NetworkUnreachable
        );

        let err = io::Error::new(io::ErrorKind::Other, "Network is unreachable (os error 101)");
        assert_eq!(
            ReplyCode::from_network_error(&err),
            ReplyCode::NetworkUnreachable
        );
    }

    #[test]
    fn test_network_error_heuristic_fallback() {
        let cases = [
            "no route to host",
            "deadline has elapsed",
            "failed to lookup address information",
            "",
        ];

        for msg in cases {
            let err = io::Error::new(io::ErrorKind::Other, msg);
            assert_eq!(
                ReplyCode::from_network_error(&err),
                ReplyCode::HostUnreachable,
                "message: {:?}",
                msg
            );
        }
    }

    #[test]
    fn test_network_error_heuristic_ignores_error_kind() {
        // Only the text matters, not the io::ErrorKind
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "boom");
        assert_eq!(
            ReplyCode::from_network_error(&err),
            ReplyCode::HostUnreachable
        );
    }

    #[test]
    fn test_socks_error_kind() {
        assert_eq!(SocksError::UnsupportedVersion(4).kind(), ErrorKind::Protocol);
        assert_eq!(
            SocksError::TruncatedAddress { need: 7, got: 3 }.kind(),
            ErrorKind::Protocol
        );
        assert_eq!(SocksError::AuthFailed.kind(), ErrorKind::Auth);
        assert_eq!(SocksError::NoAcceptableMethod.kind(), ErrorKind::Auth);
        assert_eq!(
            SocksError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            SocksError::Io(io::Error::from(io::ErrorKind::OutOfMemory)).kind(),
            ErrorKind::Resource
        );
    }

    #[test]
    fn test_socks_error_display() {
        assert_eq!(
            SocksError::UnsupportedVersion(4).to_string(),
            "Unsupported SOCKS version: 4"
        );
        assert_eq!(
            SocksError::NoAcceptableMethod.to_string(),
            "No acceptable authentication method"
        );
        assert_eq!(
            SocksError::AddressTypeNotSupported(0x99).to_string(),
            "Address type not supported: 153"
        );
        assert_eq!(
            SocksError::TruncatedAddress { need: 7, got: 3 }.to_string(),
            "Truncated address: need 7 bytes, got 3"
        );
        assert_eq!(
            SocksError::PacketTooShort(2).to_string(),
            "UDP packet too short: 2 bytes"
        );
    }

    #[test]
    fn test_socks_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: SocksError = io_err.into();
        assert!(matches!(err, SocksError::Io(_)));
    }
}
