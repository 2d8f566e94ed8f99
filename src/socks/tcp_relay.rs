//! TCP relay for SOCKS5 CONNECT command
//!
//! Dials the destination, replies, then copies bytes in both directions
//! until both reach end-of-stream.

use crate::socks::addr::AddrSpec;
use crate::socks::command::ResponseWriter;
use crate::socks::stream::ProxyStream;
use anyhow::{Context, Result};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Establishes a TCP connection to the destination within `connect_timeout`
/// 2. On failure, sends the reply code picked from the error text
/// 3. On success, sends Succeeded with the outbound socket's local address
/// 4. Relays data bidirectionally between client and target
pub async fn handle_connect(
    mut rw: ResponseWriter,
    dest: &AddrSpec,
    connect_timeout: Duration,
) -> Result<()> {
    debug!("Connecting to target: {}", dest);

    let target = match dial(dest, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            let code = rw
                .send_network_error(&e)
                .await
                .context("Failed to send failure reply")?;
            warn!("Failed to connect to {}: {} (reply {:?})", dest, e, code);
            return Err(e).with_context(|| format!("Failed to connect to {}", dest));
        }
    };

    let local = target
        .local_addr()
        .context("Failed to query outbound local address")?;
    rw.send_succeeded(local)
        .await
        .context("Failed to send success reply")?;

    info!("SOCKS5 tunnel established to {}", dest);

    let (up, down) = relay(rw.into_inner(), target)
        .await
        .with_context(|| format!("Relay to {} failed", dest))?;
    debug!("Relay to {} finished: {} bytes up, {} bytes down", dest, up, down);

    Ok(())
}

async fn dial(dest: &AddrSpec, connect_timeout: Duration) -> io::Result<TcpStream> {
    let connect = async {
        match dest {
            AddrSpec::Ip(addr) => TcpStream::connect(addr).await,
            AddrSpec::Fqdn(name, port) => TcpStream::connect((name.as_str(), *port)).await,
        }
    };

    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {} timed out", dest),
        )),
    }
}

/// Relay data bidirectionally between two streams
///
/// Each direction shuts down its sink once its source is exhausted, when the
/// sink supports a half-close. Returns once both directions are done, or as
/// soon as either fails, with `(a_to_b, b_to_a)` byte counts.
pub async fn relay<A, B>(a: A, b: B) -> io::Result<(u64, u64)>
where
    A: ProxyStream,
    B: ProxyStream,
{
    let a_half_close = a.can_half_close();
    let b_half_close = b.can_half_close();

    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = pipe(&mut a_read, &mut b_write, b_half_close);
    let b_to_a = pipe(&mut b_read, &mut a_write, a_half_close);
    tokio::pin!(a_to_b, b_to_a);

    let mut up = None;
    let mut down = None;

    while up.is_none() || down.is_none() {
        tokio::select! {
            result = &mut a_to_b, if up.is_none() => {
                up = Some(result?);
                debug!("A->B finished: {} bytes", up.unwrap_or_default());
            }
            result = &mut b_to_a, if down.is_none() => {
                down = Some(result?);
                debug!("B->A finished: {} bytes", down.unwrap_or_default());
            }
        }
    }

    Ok((up.unwrap_or_default(), down.unwrap_or_default()))
}

/// Copy until EOF or error, then half-close the sink when allowed
///
/// A copy error wins over a shutdown error.
async fn pipe<R, W>(reader: &mut R, writer: &mut W, half_close: bool) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(reader, writer).await;
    if half_close {
        let shutdown = writer.shutdown().await;
        if copied.is_ok() {
            shutdown?;
        }
    }
    copied
}
