//! UDP relay configuration
//!
//! Tunables for UDP ASSOCIATE: datagram buffers, per-session queues and the
//! widening read deadline that retires idle sessions.

use crate::socks::consts::{
    DEFAULT_IDLE_STEP_MS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_SESSION_QUEUE, DEFAULT_UDP_BUFFER_SIZE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default datagram buffer size in bytes
fn default_buffer_size() -> usize {
    DEFAULT_UDP_BUFFER_SIZE
}

/// Default per-session queue depth
fn default_queue_size() -> usize {
    DEFAULT_SESSION_QUEUE
}

/// Default deadline step in milliseconds
fn default_idle_step_ms() -> u64 {
    DEFAULT_IDLE_STEP_MS
}

/// Default deadline ceiling in milliseconds
fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

/// Default number of idle buffers kept by the pool
fn default_pool_idle() -> usize {
    1024
}

/// UDP relay configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UdpConfig {
    /// Bytes per pooled datagram buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Bounded queue depth per session; the newest datagram is dropped when full
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Read deadline step in milliseconds (0 means start at the ceiling)
    #[serde(default = "default_idle_step_ms")]
    pub idle_step_ms: u64,

    /// Read deadline ceiling in milliseconds
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Maximum idle buffers kept for reuse
    #[serde(default = "default_pool_idle")]
    pub pool_idle: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig {
            buffer_size: default_buffer_size(),
            queue_size: default_queue_size(),
            idle_step_ms: default_idle_step_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            pool_idle: default_pool_idle(),
        }
    }
}

impl UdpConfig {
    /// Deadline step as a duration
    pub fn idle_step(&self) -> Duration {
        Duration::from_millis(self.idle_step_ms)
    }

    /// Deadline ceiling as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        if self.queue_size == 0 {
            return Err("queue_size must be greater than 0".to_string());
        }
        if self.idle_timeout_ms == 0 {
            return Err("idle_timeout_ms must be greater than 0".to_string());
        }
        if self.idle_step_ms > self.idle_timeout_ms {
            return Err("idle_step_ms cannot be greater than idle_timeout_ms".to_string());
        }
        Ok(())
    }
}
