//! SOCKS5 command dispatch
//!
//! A [`CommandHandler`] receives each parsed request together with the
//! [`ResponseWriter`] that owns the control stream. [`DefaultHandler`] serves
//! CONNECT and UDP ASSOCIATE and refuses everything else.

use crate::config::ServerConfig;
use crate::pool::BufferPool;
use crate::socks::command::{Request, ResponseWriter};
use crate::socks::tcp_relay::handle_connect;
use crate::socks::types::SocksCommand;
use crate::socks::udp::handle_associate;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handles one parsed request
///
/// Invoked at most once per connection, after authentication succeeded.
/// The connection is closed when the handler returns.
#[async_trait]
pub trait CommandHandler: Send + Sync + Debug {
    /// Serve the request, replying through `rw`
    async fn handle(&self, rw: ResponseWriter, req: Request) -> Result<()>;
}

/// CONNECT and UDP ASSOCIATE
#[derive(Debug, Clone)]
pub struct DefaultHandler {
    config: Arc<ServerConfig>,
    pool: BufferPool,
    shutdown: CancellationToken,
}

impl DefaultHandler {
    /// Create a handler; `shutdown` is the parent of every association token
    pub fn new(config: Arc<ServerConfig>, pool: BufferPool, shutdown: CancellationToken) -> Self {
        DefaultHandler {
            config,
            pool,
            shutdown,
        }
    }
}

#[async_trait]
impl CommandHandler for DefaultHandler {
    async fn handle(&self, mut rw: ResponseWriter, req: Request) -> Result<()> {
        match req.command() {
            Some(SocksCommand::Connect) => {
                info!("SOCKS5 CONNECT request to {}", req.dest);
                handle_connect(rw, &req.dest, self.config.connect_timeout()).await
            }
            Some(SocksCommand::UdpAssociate) if self.config.allow_udp => {
                info!("SOCKS5 UDP ASSOCIATE request from {:?}", req.remote_addr);
                handle_associate(
                    rw,
                    &req,
                    &self.config.udp,
                    self.pool.clone(),
                    &self.shutdown,
                )
                .await
            }
            Some(SocksCommand::UdpAssociate) => {
                warn!("UDP ASSOCIATE not allowed by configuration");
                rw.send_command_not_supported().await?;
                Ok(())
            }
            _ => {
                warn!("Command {:#04x} not supported", req.command);
                rw.send_command_not_supported().await?;
                Ok(())
            }
        }
    }
}
