//! SOCKS5 protocol implementation
//!
//! Wire codecs, authentication, request handling and the CONNECT and
//! UDP ASSOCIATE relays.

pub mod addr;
pub mod auth;
pub mod command;
pub mod consts;
pub mod handler;
pub mod stream;
pub mod tcp_relay;
pub mod types;
pub mod udp;

pub use addr::{parse_addr, split_addr, AddrSpec, WireAddr};
pub use auth::{AuthRegistry, Authenticator, Credentials, DynamicUserPass, NoAuth, StaticUserPass};
pub use command::{encode_reply, Request, ResponseWriter};
pub use handler::{CommandHandler, DefaultHandler};
pub use stream::ProxyStream;
pub use tcp_relay::relay;
pub use types::{Identity, SocksCommand};
