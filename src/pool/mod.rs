//! Byte buffer pool
//!
//! UDP datagrams are read into buffers borrowed from a shared pool and handed
//! to session tasks; the [`PooledBuf`] guard gives them back on drop.

mod guard;

pub use guard::PooledBuf;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared pool state
pub(crate) struct PoolInner {
    /// Buffers waiting to be reused
    idle: Mutex<Vec<Vec<u8>>>,
    /// Maximum number of idle buffers kept
    max_idle: usize,
    /// Buffers currently handed out
    in_use: AtomicUsize,
}

impl PoolInner {
    fn put_back(&self, buf: Vec<u8>) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);

        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// Pool of reusable byte buffers
///
/// Cheap to clone; all clones share the same storage.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool keeping at most `max_idle` buffers for reuse
    pub fn new(max_idle: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                max_idle,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Borrow a zeroed-or-reused buffer of exactly `size` visible bytes
    pub fn acquire(&self, size: usize) -> PooledBuf {
        let reused = {
            let mut idle = self.inner.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };

        let mut buf = reused.unwrap_or_default();
        if buf.len() < size {
            buf.resize(size, 0);
        }

        self.inner.in_use.fetch_add(1, Ordering::AcqRel);
        PooledBuf::new(buf, size, self.inner.clone())
    }

    /// Buffers currently borrowed
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Buffers waiting for reuse
    pub fn idle(&self) -> usize {
        self.inner
            .idle
            .lock()
            .map(|idle| idle.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_idle", &self.inner.max_idle)
            .field("in_use", &self.in_use())
            .finish()
    }
}
