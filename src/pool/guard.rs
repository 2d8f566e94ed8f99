//! RAII guard for pooled buffers
//!
//! A [`PooledBuf`] returns its storage to the owning pool when dropped, so a
//! buffer is released exactly once on every exit path.

use super::PoolInner;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Buffer borrowed from a [`BufferPool`](super::BufferPool)
pub struct PooledBuf {
    /// Storage (Option to allow taking on drop)
    buf: Option<Vec<u8>>,
    /// Visible length
    len: usize,
    /// Pool to return the storage to
    pool: Arc<PoolInner>,
}

impl PooledBuf {
    pub(super) fn new(buf: Vec<u8>, len: usize, pool: Arc<PoolInner>) -> Self {
        PooledBuf {
            buf: Some(buf),
            len,
            pool,
        }
    }

    /// Shrink the visible length, keeping the storage
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Visible length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the visible length is zero
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the buffer to the pool now
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf[..self.len],
            None => &[],
        }
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => &mut buf[..self.len],
            None => &mut [],
        }
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf").field("len", &self.len).finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put_back(buf);
        }
    }
}
