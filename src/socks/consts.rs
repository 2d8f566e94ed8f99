//! SOCKS5 protocol constants
//!
//! Wire values from RFC 1928 and RFC 1929, plus the UDP relay defaults.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// Username/password sub-negotiation version
pub const SOCKS5_AUTH_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// Username/password authentication
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Username/password status
/// Credentials accepted
pub const SOCKS5_AUTH_SUCCESS: u8 = 0x00;
/// Credentials rejected
pub const SOCKS5_AUTH_FAILURE: u8 = 0x01;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// RSV(2) + FRAG(1) in front of every relayed datagram
pub const UDP_HEADER_LEN: usize = 3;

/// Default per-datagram buffer size
pub const DEFAULT_UDP_BUFFER_SIZE: usize = 65535;

/// Default bounded queue depth per UDP session
pub const DEFAULT_SESSION_QUEUE: usize = 32;

/// Default read deadline step for UDP sessions
pub const DEFAULT_IDLE_STEP_MS: u64 = 5_000;

/// Default read deadline ceiling for UDP sessions
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;
