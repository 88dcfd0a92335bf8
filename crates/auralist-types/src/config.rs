//! Validated configuration value types for Auralist
//!
//! These newtypes are shared by the config loader and the components that consume the
//! values, so an invalid chunk size or queue length can never reach the engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size of one chunk in a chunked transfer, also the chunking threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkSize(u64);

impl ChunkSize {
    /// Default chunk size (100MB)
    pub const DEFAULT: u64 = 100 * 1000 * 1000;

    /// Create a new chunk size with validation
    pub fn new(size: u64) -> Result<Self, String> {
        if size == 0 {
            Err("Chunk size must be greater than zero".to_string())
        } else {
            Ok(Self(size))
        }
    }

    /// Get the chunk size value
    pub fn get(self) -> u64 {
        self.0
    }

    /// Check whether a file of `size` bytes must be chunked
    pub fn requires_chunking(self, size: u64) -> bool {
        size > self.0
    }

    /// Number of chunks a file of `size` bytes is split into
    pub fn chunk_count(self, size: u64) -> u64 {
        size.div_ceil(self.0)
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Flush thresholds for the crawler's path batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Flush when this many paths are queued
    pub queue_length: usize,
    /// Flush when the queued sizes sum to at least this many bytes
    pub size_limit: u64,
}

impl BatchLimits {
    /// Default byte limit (500MB)
    pub const DEFAULT_SIZE_LIMIT: u64 = 500 * 1000 * 1000;

    /// Create batch limits with validation
    pub fn new(queue_length: usize, size_limit: u64) -> Result<Self, String> {
        if queue_length == 0 {
            return Err("Queue length must be greater than zero".to_string());
        }
        if size_limit == 0 {
            return Err("Batch size limit must be greater than zero".to_string());
        }
        Ok(Self {
            queue_length,
            size_limit,
        })
    }

    /// Queue length derived from the CPU count
    pub fn default_queue_length() -> usize {
        num_cpus::get() * 4
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            queue_length: Self::default_queue_length(),
            size_limit: Self::DEFAULT_SIZE_LIMIT,
        }
    }
}

/// Fixed-delay reconnect policy for the remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay between connection attempts
    pub delay: Duration,
    /// Maximum attempts per call; `u32::MAX` retries forever
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Retry forever with a fixed delay
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: u32::MAX,
        }
    }

    /// Check whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts == u32::MAX || attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::forever(Duration::from_secs(10))
    }
}
