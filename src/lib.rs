//! # socksd - SOCKS5 proxy server core
//!
//! socksd implements the server side of SOCKS version 5 (RFC 1928) with
//! username/password authentication (RFC 1929). It serves TCP CONNECT and
//! UDP ASSOCIATE; BIND and SOCKS4 are not supported.
//!
//! ## Features
//!
//! - **Pluggable Authentication**: one [`Authenticator`](socks::Authenticator) per method byte
//! - **Pluggable Commands**: swap the [`CommandHandler`](socks::CommandHandler) per server
//! - **Half-Close Relay**: CONNECT propagates end-of-stream in each direction separately
//! - **UDP ASSOCIATE**: per-source sessions with a widening idle deadline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::config::load_config;
//! use socksd::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let server = Server::new(config.server);
//!
//!     server.listen_and_serve().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! client --TCP--> Server::serve_conn --> AuthRegistry --> Request --> CommandHandler
//!                                                                     |-- CONNECT: tcp_relay
//!                                                                     `-- ASSOCIATE: udp
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod pool;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config, ServerConfig};
pub use error::{ErrorKind, ReplyCode, SocksError};
pub use server::Server;

/// Version of the socksd library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
