//! SOCKS5 server
//!
//! [`Server`] drives accepted connections through greeting, authentication
//! and request parsing, then hands each request to its [`CommandHandler`].
//!
//! # Protocol Flow
//!
//! 1. Greeting version (must be 5)
//! 2. Method negotiation and the chosen method's sub-negotiation
//! 3. Request header and destination
//! 4. Exactly one handler invocation
//!
//! The connection is closed on every exit path.

use crate::config::ServerConfig;
use crate::error::{ErrorKind, SocksError};
use crate::pool::BufferPool;
use crate::socks::auth::{AuthRegistry, NoAuth, StaticUserPass};
use crate::socks::command::{read_version, Request, ResponseWriter};
use crate::socks::consts::SOCKS5_VERSION;
use crate::socks::handler::{CommandHandler, DefaultHandler};
use crate::socks::stream::ProxyStream;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// SOCKS5 server
///
/// Cheap to clone; clones share configuration, handlers and the shutdown
/// token.
#[derive(Debug, Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    auth: Arc<AuthRegistry>,
    handler: Arc<dyn CommandHandler>,
    pool: BufferPool,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a server from configuration
    ///
    /// Registers username/password auth when credentials are configured,
    /// otherwise no-auth, and the default CONNECT/ASSOCIATE handler.
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let pool = BufferPool::new(config.udp.pool_idle);
        let shutdown = CancellationToken::new();

        let auth = match config.credentials() {
            Some((username, password)) => {
                AuthRegistry::new().with(StaticUserPass::new(username, password))
            }
            None => AuthRegistry::new().with(NoAuth),
        };

        let handler = DefaultHandler::new(config.clone(), pool.clone(), shutdown.clone());

        Server {
            config,
            auth: Arc::new(auth),
            handler: Arc::new(handler),
            pool,
            shutdown,
        }
    }

    /// Replace the authentication registry
    pub fn with_auth(mut self, auth: AuthRegistry) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Replace the command handler
    pub fn with_handler<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared datagram buffer pool
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Token that stops the accept loop and every live association
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured address and serve until shut down
    pub async fn listen_and_serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        self.serve(listener).await
    }

    /// Accept connections until the shutdown token is cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("SOCKS5 server listening on {}", listener.local_addr()?);

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("SOCKS5 server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            debug!("Accepted connection from {}", peer);
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_tcp(stream).await {
                    match failure_kind(&e) {
                        Some(ErrorKind::Protocol) | Some(ErrorKind::Auth) => {
                            debug!("Connection from {} rejected: {:#}", peer, e)
                        }
                        _ => error!("Connection from {} failed: {:#}", peer, e),
                    }
                }
            });
        }
    }

    /// Serve one TCP connection
    pub async fn serve_tcp(&self, stream: TcpStream) -> Result<()> {
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        self.serve_conn(stream, local, remote).await
    }

    /// Serve one connection over any stream
    ///
    /// # Arguments
    ///
    /// * `stream` - The client's control stream
    /// * `local_addr` - Server side endpoint, used to bind UDP relays
    /// * `remote_addr` - Client endpoint, attached to the request
    pub async fn serve_conn<S>(
        &self,
        stream: S,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<()>
    where
        S: ProxyStream + 'static,
    {
        let mut rw = ResponseWriter::new(Box::new(stream));

        read_version(rw.stream_mut())
            .await
            .context("Failed to read greeting")?;

        let identity = self
            .auth
            .negotiate(&mut rw)
            .await
            .context("Authentication negotiation failed")?;

        let mut req = match Request::read_from(rw.stream_mut()).await {
            Ok(req) => req,
            Err(SocksError::AddressTypeNotSupported(atyp)) => {
                rw.send_address_type_not_supported()
                    .await
                    .context("Failed to send failure reply")?;
                return Err(SocksError::AddressTypeNotSupported(atyp))
                    .context("Failed to read request");
            }
            Err(e) => return Err(e).context("Failed to read request"),
        };

        if req.version != SOCKS5_VERSION {
            return Err(SocksError::UnsupportedVersion(req.version))
                .context("Failed to read request");
        }

        req.local_addr = local_addr;
        req.remote_addr = remote_addr;
        req.identity = identity;

        debug!("Request {:#04x} to {} from {:?}", req.command, req.dest, remote_addr);
        self.handler.handle(rw, req).await
    }
}

/// Class of a failed connection, when a [`SocksError`] caused it
fn failure_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<SocksError>().map(SocksError::kind)
}
