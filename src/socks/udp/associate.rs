//! UDP ASSOCIATE handling
//!
//! An association binds one client-facing UDP socket and lives as long as the
//! client's control connection. It runs a control watcher, a dispatcher that
//! sorts datagrams into per-source sessions, and the sessions themselves, all
//! under one cancellation token.

use super::packet::PacketConn;
use super::session::{Enqueued, Message, Session, SessionTable};
use crate::config::UdpConfig;
use crate::error::SocksError;
use crate::pool::BufferPool;
use crate::socks::command::{Request, ResponseWriter};
use crate::socks::stream::ProxyStream;
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle UDP ASSOCIATE command
///
/// Binds an ephemeral UDP socket on the control connection's local address,
/// replies with it, and relays until the control stream closes or `shutdown`
/// is cancelled.
pub async fn handle_associate(
    mut rw: ResponseWriter,
    req: &Request,
    config: &UdpConfig,
    pool: BufferPool,
    shutdown: &CancellationToken,
) -> Result<()> {
    let bind_ip = req
        .local_addr
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let socket = match bind(bind_ip).await {
        Ok(socket) => socket,
        Err(e) => {
            rw.send_general_failure()
                .await
                .context("Failed to send failure reply")?;
            return Err(e).with_context(|| format!("Failed to bind UDP relay on {}", bind_ip));
        }
    };

    rw.send_succeeded(socket.local_addr)
        .await
        .context("Failed to send success reply")?;

    info!(
        "UDP association for {:?} bound on {}",
        req.remote_addr, socket.local_addr
    );

    let association = UdpAssociation::new(socket.socket, config.clone(), pool, shutdown.child_token());
    association.run(rw.into_inner()).await;

    info!("UDP association for {:?} closed", req.remote_addr);
    Ok(())
}

struct Bound {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

async fn bind(ip: IpAddr) -> std::io::Result<Bound> {
    let socket = UdpSocket::bind((ip, 0)).await?;
    let local_addr = socket.local_addr()?;
    Ok(Bound { socket, local_addr })
}

/// State shared by one association's tasks
#[derive(Debug, Clone)]
pub struct UdpAssociation {
    socket: Arc<UdpSocket>,
    sessions: SessionTable,
    config: UdpConfig,
    pool: BufferPool,
    cancel: CancellationToken,
}

impl UdpAssociation {
    /// Wrap a bound socket; `cancel` ends the association and all its sessions
    pub fn new(
        socket: UdpSocket,
        config: UdpConfig,
        pool: BufferPool,
        cancel: CancellationToken,
    ) -> Self {
        UdpAssociation {
            socket: Arc::new(socket),
            sessions: SessionTable::new(config.queue_size),
            config,
            pool,
            cancel,
        }
    }

    /// Session table, for inspection
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Token that tears the association down
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Relay until the control stream ends or the token is cancelled
    pub async fn run(&self, mut control: Box<dyn ProxyStream>) {
        let dispatcher = tokio::spawn(self.clone().dispatch());

        tokio::select! {
            _ = watch_control(&mut control) => debug!("UDP association control stream closed"),
            _ = self.cancel.cancelled() => debug!("UDP association cancelled"),
        }

        self.cancel.cancel();
        if let Err(e) = dispatcher.await {
            warn!("UDP dispatcher task failed: {}", e);
        }
    }

    /// Read datagrams off the association socket and route them to sessions
    pub async fn dispatch(self) {
        loop {
            let mut buf = self.pool.acquire(self.config.buffer_size);
            let mut conn = PacketConn::new(self.socket.clone());

            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = conn.recv_from(&mut buf) => received,
            };

            match received {
                Ok((n, src, dst)) => {
                    buf.truncate(n);
                    let dst = match dst.to_addr_spec() {
                        Ok(dst) => dst,
                        Err(e) => {
                            debug!("Dropping datagram from {}: {}", src, e);
                            continue;
                        }
                    };
                    self.route(conn, src, Message { buf, dst });
                }
                Err(SocksError::Io(e)) => {
                    warn!("UDP association recv failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => debug!("Dropping malformed datagram: {}", e),
            }
        }
    }

    fn route(&self, conn: PacketConn, src: SocketAddr, msg: Message) {
        let key = src.to_string();
        debug!("UDP {} -> {}, {} bytes", key, msg.dst, msg.buf.len());

        let outcome = self.sessions.enqueue(&key, msg, |id, rx| {
            let session = Session::new(
                key.clone(),
                id,
                conn,
                rx,
                &self.config,
                self.sessions.clone(),
                self.pool.clone(),
                self.cancel.child_token(),
            );
            tokio::spawn(session.run());
        });

        match outcome {
            Enqueued::Created => debug!("UDP session opened for {}", key),
            Enqueued::Dropped => warn!("UDP session {} queue full, datagram dropped", key),
            Enqueued::Queued => {}
        }
    }
}

/// Read and discard until the client closes or errors
async fn watch_control(control: &mut Box<dyn ProxyStream>) {
    let mut buf = [0u8; 64];
    loop {
        match control.read(&mut buf).await {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) => {
                debug!("UDP association control read failed: {}", e);
                return;
            }
        }
    }
}
