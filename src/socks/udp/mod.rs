//! UDP relay for SOCKS5 UDP ASSOCIATE
//!
//! Datagram framing, per-source sessions and the association that ties them
//! to a control connection.

mod associate;
mod packet;
mod session;

pub use associate::{handle_associate, UdpAssociation};
pub use packet::{decapsulate, encapsulate, PacketConn};
pub use session::{Enqueued, IdleWindow, Message, Session, SessionTable};
