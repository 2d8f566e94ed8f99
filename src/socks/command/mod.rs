//! SOCKS5 command module
//!
//! Request parsing and reply encoding.

mod parser;
mod reply;

pub use parser::{read_methods, read_version, Request};
pub use reply::{encode_reply, ResponseWriter};
