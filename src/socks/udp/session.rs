//! Per-source UDP relay sessions
//!
//! Every client endpoint that sends through an association gets its own
//! [`Session`]: one outbound socket, one bounded queue, one task. The
//! dispatcher only ever talks to a session by enqueueing into its channel.

use super::packet::PacketConn;
use crate::config::UdpConfig;
use crate::pool::{BufferPool, PooledBuf};
use crate::socks::addr::AddrSpec;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A datagram queued for one session
#[derive(Debug)]
pub struct Message {
    /// Payload, returned to the pool when the message is dropped
    pub buf: PooledBuf,
    /// Where the payload goes
    pub dst: AddrSpec,
}

/// Read deadline that widens on every successful read
///
/// Starts at zero and grows by `step` per pass, clamped to `ceiling`. A zero
/// step jumps straight to the ceiling.
#[derive(Debug, Clone, Copy)]
pub struct IdleWindow {
    step: Duration,
    ceiling: Duration,
    current: Duration,
}

impl IdleWindow {
    /// New window at zero
    pub fn new(step: Duration, ceiling: Duration) -> Self {
        IdleWindow {
            step,
            ceiling,
            current: Duration::ZERO,
        }
    }

    /// Widen and return the next read timeout
    pub fn advance(&mut self) -> Duration {
        self.current += self.step;
        if self.current.is_zero() || self.current > self.ceiling {
            self.current = self.ceiling;
        }
        self.current
    }

    /// Current read timeout
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Outcome of handing a datagram to the session table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued on an existing session
    Queued,
    /// A new session was created for it
    Created,
    /// The session's queue was full; the datagram was dropped
    Dropped,
}

#[derive(Debug)]
struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<Message>,
}

/// Live sessions of one association, keyed by source endpoint
#[derive(Debug, Clone)]
pub struct SessionTable {
    sessions: Arc<DashMap<String, SessionHandle>>,
    next_id: Arc<AtomicU64>,
    queue_size: usize,
}

impl SessionTable {
    /// Create an empty table whose sessions queue at most `queue_size` messages
    pub fn new(queue_size: usize) -> Self {
        SessionTable {
            sessions: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_size: queue_size.max(1),
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether a session exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }

    /// Queue `msg` on the session for `key`, creating one if needed
    ///
    /// `start` receives the new session's id and queue and must spawn its
    /// task. It runs after the table entry is released. A session whose task
    /// is gone is replaced.
    pub fn enqueue<F>(&self, key: &str, msg: Message, start: F) -> Enqueued
    where
        F: FnOnce(u64, mpsc::Receiver<Message>),
    {
        let created = match self.sessions.entry(key.to_string()) {
            Entry::Occupied(mut entry) => match entry.get().tx.try_send(msg) {
                Ok(()) => return Enqueued::Queued,
                Err(TrySendError::Full(_)) => return Enqueued::Dropped,
                Err(TrySendError::Closed(msg)) => {
                    let (handle, rx) = self.open(msg);
                    let id = handle.id;
                    entry.insert(handle);
                    (id, rx)
                }
            },
            Entry::Vacant(entry) => {
                let (handle, rx) = self.open(msg);
                let id = handle.id;
                entry.insert(handle);
                (id, rx)
            }
        };

        let (id, rx) = created;
        start(id, rx);
        Enqueued::Created
    }

    fn open(&self, msg: Message) -> (SessionHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        // Fresh channel with capacity >= 1 cannot be full
        let _ = tx.try_send(msg);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (SessionHandle { id, tx }, rx)
    }

    /// Remove `key` only if it still belongs to session `id`
    pub fn remove_if(&self, key: &str, id: u64) -> bool {
        self.sessions
            .remove_if(key, |_, handle| handle.id == id)
            .is_some()
    }
}

/// Outbound socket of a session
///
/// One dual-stack socket on `[::]` reaches both families; IPv4 destinations
/// are sent as IPv4-mapped addresses and mapped back on receive. Where IPv6
/// is unavailable it falls back to `0.0.0.0`, which reaches IPv4 only.
#[derive(Debug)]
struct Outbound {
    socket: UdpSocket,
    dual_stack: bool,
}

impl Outbound {
    async fn bind() -> io::Result<Self> {
        match UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await {
            Ok(socket) => Ok(Outbound {
                socket,
                dual_stack: true,
            }),
            Err(e) => {
                debug!("IPv6 outbound bind failed, falling back to IPv4: {}", e);
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
                Ok(Outbound {
                    socket,
                    dual_stack: false,
                })
            }
        }
    }

    async fn send_to(&self, payload: &[u8], dst: SocketAddr) -> io::Result<usize> {
        let dst = match dst {
            SocketAddr::V4(v4) if self.dual_stack => {
                SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port())
            }
            other => other,
        };
        self.socket.send_to(payload, dst).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (n, from) = self.socket.recv_from(buf).await?;
        Ok((n, unmap(from)))
    }
}

/// Undo IPv4-mapping so replies carry a plain IPv4 source
fn unmap(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        v4 => v4,
    }
}

/// One source endpoint's relay state, owned by its task
#[derive(Debug)]
pub struct Session {
    key: String,
    id: u64,
    /// Frames replies back toward the source endpoint
    conn: PacketConn,
    rx: mpsc::Receiver<Message>,
    /// Dialed on the first message
    outbound: Option<Outbound>,
    window: IdleWindow,
    buffer_size: usize,
    table: SessionTable,
    pool: BufferPool,
    cancel: CancellationToken,
}

impl Session {
    /// Assemble a session; call [`run`](Self::run) on its own task
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: String,
        id: u64,
        conn: PacketConn,
        rx: mpsc::Receiver<Message>,
        config: &UdpConfig,
        table: SessionTable,
        pool: BufferPool,
        cancel: CancellationToken,
    ) -> Self {
        Session {
            key,
            id,
            conn,
            rx,
            outbound: None,
            window: IdleWindow::new(config.idle_step(), config.idle_timeout()),
            buffer_size: config.buffer_size,
            table,
            pool,
            cancel,
        }
    }

    /// Source endpoint key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Forward queued datagrams and relay replies until idle, failed or cancelled
    ///
    /// The session removes itself from the table on every exit path.
    pub async fn run(mut self) -> io::Result<()> {
        let result = self.relay().await;
        self.retire();

        match &result {
            Ok(()) => debug!("UDP session {} closed", self.key),
            Err(e) => debug!("UDP session {} failed: {}", self.key, e),
        }
        result
    }

    /// Close the queue, then drop the table entry if it is still ours
    ///
    /// Once the queue is closed the dispatcher replaces this session instead
    /// of queueing into it.
    fn retire(&mut self) {
        self.rx.close();
        self.table.remove_if(&self.key, self.id);
    }

    async fn relay(&mut self) -> io::Result<()> {
        let mut reply_buf = self.pool.acquire(self.buffer_size);
        let mut deadline = Instant::now() + self.window.advance();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),

                msg = self.rx.recv() => match msg {
                    Some(msg) => self.forward(msg).await?,
                    None => return Ok(()),
                },

                res = recv_outbound(self.outbound.as_ref(), &mut reply_buf) => {
                    let (n, from) = res?;
                    if let Err(e) = self.conn.send_to(&reply_buf[..n], Some(from)).await {
                        warn!("UDP reply from {} to {} failed: {}", from, self.key, e);
                    }
                    deadline = Instant::now() + self.window.advance();
                }

                _ = tokio::time::sleep_until(deadline) => {
                    debug!(
                        "UDP session {} idle for {:?}",
                        self.key,
                        self.window.current()
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Send one queued datagram
    ///
    /// Only failing to open the outbound socket is fatal; resolve and write
    /// errors drop the datagram.
    async fn forward(&mut self, msg: Message) -> io::Result<()> {
        let dst = match msg.dst.resolve().await {
            Ok(dst) => dst,
            Err(e) => {
                warn!("UDP session {}: cannot resolve {}: {}", self.key, msg.dst, e);
                return Ok(());
            }
        };

        if self.outbound.is_none() {
            let outbound = Outbound::bind().await?;
            debug!(
                "UDP session {} dialed via {:?}",
                self.key,
                outbound.socket.local_addr().ok()
            );
            self.outbound = Some(outbound);
        }

        if let Some(outbound) = &self.outbound {
            if let Err(e) = outbound.send_to(&msg.buf, dst).await {
                warn!("UDP session {}: write to {} failed: {}", self.key, dst, e);
            }
        }
        Ok(())
    }
}

async fn recv_outbound(
    outbound: Option<&Outbound>,
    buf: &mut [u8],
) -> io::Result<(usize, SocketAddr)> {
    match outbound {
        Some(outbound) => outbound.recv_from(buf).await,
        None => std::future::pending().await,
    }
}
