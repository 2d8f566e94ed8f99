//! Transport abstraction for client and target streams
//!
//! The orchestrator and the TCP relay work on any [`ProxyStream`]. The only
//! optional capability is half-close: shutting down the write direction
//! while still reading. Streams that cannot do it are fully closed when the
//! relay completes.

use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// Bidirectional byte stream accepted by the server
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {
    /// Whether `shutdown()` on this stream closes only the write direction
    fn can_half_close(&self) -> bool {
        false
    }
}

impl ProxyStream for TcpStream {
    fn can_half_close(&self) -> bool {
        true
    }
}

impl ProxyStream for DuplexStream {
    fn can_half_close(&self) -> bool {
        true
    }
}

impl ProxyStream for Box<dyn ProxyStream> {
    fn can_half_close(&self) -> bool {
        (**self).can_half_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[derive(Debug)]
    struct Plain(DuplexStream);

    impl AsyncRead for Plain {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Plain {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.0).poll_shutdown(cx)
        }
    }

    impl ProxyStream for Plain {}

    #[test]
    fn test_default_has_no_half_close() {
        let (a, _b) = tokio::io::duplex(16);
        let plain = Plain(a);
        assert!(!plain.can_half_close());

        let boxed: Box<dyn ProxyStream> = Box::new(plain);
        assert!(!boxed.can_half_close());
    }

    #[test]
    fn test_duplex_half_close() {
        let (a, _b) = tokio::io::duplex(16);
        let boxed: Box<dyn ProxyStream> = Box::new(a);
        assert!(boxed.can_half_close());
    }
}
