//! Test utilities and mocks for socksd
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use socksd::config::ServerConfig;
use socksd::socks::stream::ProxyStream;
use socksd::Server;
use std::io::Cursor;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start a server on loopback; cancel the returned token to stop it
pub async fn start_server(config: ServerConfig) -> (SocketAddr, CancellationToken) {
    start(Server::new(config)).await
}

/// Start a preconfigured server on loopback
pub async fn start(server: Server) -> (SocketAddr, CancellationToken) {
    let (listener, addr) = create_test_listener().await;
    let token = server.shutdown_token();
    tokio::spawn(async move { server.serve(listener).await });
    (addr, token)
}

/// Server config with small UDP idle windows
pub fn fast_idle_config(step_ms: u64, ceiling_ms: u64) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.udp.idle_step_ms = step_ms;
    config.udp.idle_timeout_ms = ceiling_ms;
    config
}

/// TCP server that echoes every connection back to itself
pub async fn tcp_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// UDP server that echoes each datagram to its sender
pub async fn udp_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });
    addr
}

/// UDP server that answers each datagram with the sender's address as text
pub async fn udp_peer_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        while let Ok((_, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(peer.to_string().as_bytes(), peer).await;
        }
    });
    addr
}

/// Connect to the proxy and complete no-auth negotiation
pub async fn connect_no_auth(proxy: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(&socks5_mock::create_auth_request_no_auth())
        .await
        .unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [5, 0]);
    stream
}

/// Send a request and read back an IPv4 reply, returning (code, bound address)
pub async fn send_request(stream: &mut TcpStream, request: &[u8]) -> (u8, SocketAddr) {
    stream.write_all(request).await.unwrap();

    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 5);
    assert_eq!(reply[3], 1);

    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (reply[1], SocketAddr::from((ip, port)))
}

/// Open a UDP association, returning the control stream and relay address
pub async fn udp_associate(proxy: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut control = connect_no_auth(proxy).await;
    let (code, relay) =
        send_request(&mut control, &socks5_mock::create_udp_associate_ipv4()).await;
    assert_eq!(code, 0);
    (control, relay)
}

/// Send one datagram through the relay and wait for one reply
///
/// Returns the source address from the reply header and the payload.
pub async fn udp_round_trip(
    client: &UdpSocket,
    relay: SocketAddr,
    dest: SocketAddr,
    payload: &[u8],
) -> (SocketAddr, Vec<u8>) {
    client
        .send_to(&socks5_mock::create_udp_datagram(dest, payload), relay)
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (n, from) = tokio::time::timeout(std::time::Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, relay);

    let (len, addr) = socksd::socks::udp::decapsulate(&mut buf[..n]).unwrap();
    let source = addr.to_addr_spec().unwrap().resolve().await.unwrap();
    (source, buf[..len].to_vec())
}

/// In-memory stream that serves scripted input and records everything else
///
/// `consumed` counts the input bytes the server has read so far.
#[derive(Debug)]
pub struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    pub output: Arc<Mutex<Vec<u8>>>,
    pub consumed: Arc<AtomicUsize>,
}

impl ScriptedStream {
    /// Create a stream that yields `input` then end-of-stream
    pub fn new(input: Vec<u8>) -> Self {
        ScriptedStream {
            input: Cursor::new(input),
            output: Arc::new(Mutex::new(Vec::new())),
            consumed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.input).poll_read(cx, buf);
        this.consumed
            .store(this.input.position() as usize, Ordering::SeqCst);
        poll
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl ProxyStream for ScriptedStream {}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use socksd::socks::consts::*;
    use socksd::socks::AddrSpec;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create a username/password sub-negotiation
    pub fn create_userpass(username: &str, password: &str) -> Vec<u8> {
        let mut msg = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        msg.extend_from_slice(username.as_bytes());
        msg.push(password.len() as u8);
        msg.extend_from_slice(password.as_bytes());
        msg
    }

    /// Create a connect command to a socket address
    pub fn create_connect(dest: SocketAddr) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
        cmd.extend_from_slice(&AddrSpec::from(dest).to_bytes());
        cmd
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Create a UDP associate command with an unspecified client address
    pub fn create_udp_associate_ipv4() -> Vec<u8> {
        vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_UDP_ASSOCIATE,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            0,
            0,
            0,
            0,
            0,
            0,
        ]
    }

    /// Create a relayed datagram addressed to `dest`
    pub fn create_udp_datagram(dest: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut datagram = vec![0, 0, 0];
        datagram.extend_from_slice(&AddrSpec::from(dest).to_bytes());
        datagram.extend_from_slice(payload);
        datagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[tokio::test]
    async fn test_scripted_stream_counts_reads() {
        let mut stream = ScriptedStream::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(stream.consumed.load(Ordering::SeqCst), 3);

        stream.write_all(b"out").await.unwrap();
        assert_eq!(stream.output.lock().unwrap().as_slice(), b"out");
    }

    #[test]
    fn test_socks5_mock_connect_ipv4() {
        let cmd = socks5_mock::create_connect("192.168.1.1:8080".parse().unwrap());
        assert_eq!(cmd[0], 5); // SOCKS5 version
        assert_eq!(cmd[1], 1); // CONNECT
        assert_eq!(cmd[3], 1); // IPv4
        assert_eq!(&cmd[4..8], &[192, 168, 1, 1]);
        assert_eq!(&cmd[8..10], &8080u16.to_be_bytes());
    }

    #[test]
    fn test_socks5_mock_userpass() {
        let msg = socks5_mock::create_userpass("ab", "c");
        assert_eq!(msg, vec![1, 2, b'a', b'b', 1, b'c']);
    }
}
