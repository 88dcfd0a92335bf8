//! Core data types for Auralist
//!
//! The catalog record, the per-file synchronization states and the crawler's in-memory
//! batch live here so every crate in the workspace agrees on their shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for catalog records
pub type RecordId = uuid::Uuid;

/// File size in bytes
pub type FileSize = u64;

/// Lowercase hex SHA-256 of zero bytes of input
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// One indexed file as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Record identifier
    pub id: RecordId,
    /// XXH3-64 of the relative path; existence pre-filter only
    pub path_hash: u64,
    /// Path relative to the search directory, `/` separated
    pub relative_path: String,
    /// Search directory the file was found under
    pub base_directory: String,
    /// File name including extension
    pub file_name: String,
    /// Size in bytes at discovery time
    pub size_bytes: FileSize,
    /// Lowercased extension without the leading dot
    pub extension: String,
    /// IEEE CRC-32 of the content, widened
    pub crc32: u64,
    /// Confirmed strong digest; `None` until verified against a remote target
    pub strong_digest: Option<String>,
    /// Host holding the authoritative local copy
    pub host_name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Time a remote byte-for-byte match was confirmed
    pub verified_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Check whether a remote match has been confirmed for this record
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Absolute local path of the file
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(&self.base_directory).join(&self.relative_path)
    }

    /// Join the relative path onto a remote root
    pub fn remote_path(&self, root: &str) -> String {
        join_remote(root, &self.relative_path)
    }
}

/// Join a relative `/`-separated path onto a remote root
pub fn join_remote(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if root.is_empty() {
        format!("/{relative}")
    } else {
        format!("{root}/{relative}")
    }
}

/// Parent directory of a remote path, if it has one
pub fn remote_parent(path: &str) -> Option<&str> {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => Some("/"),
        Some(index) => Some(&path[..index]),
        None => None,
    }
}

/// Synchronization state of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not yet confirmed against the destination
    Pending,
    /// Destination already held identical bytes
    Skipped,
    /// Zero-length file created remotely
    ZeroCreated,
    /// Server-side copy from the old root
    ClonedFromOld,
    /// Bytes were streamed to the destination
    Uploaded,
    /// Destination digest confirmed after upload
    Verified,
}

impl SyncState {
    /// Check if no further transition can happen from this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::ZeroCreated | Self::Verified)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::ZeroCreated => "zero-created",
            Self::ClonedFromOld => "cloned-from-old",
            Self::Uploaded => "uploaded",
            Self::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// A path discovered by the crawler and not yet hashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Absolute path on the local filesystem
    pub path: PathBuf,
    /// Path relative to the search directory
    pub relative_path: String,
    /// Size reported by the directory walk
    pub size: FileSize,
}

/// Ephemeral queue of discovered paths awaiting a flush
#[derive(Debug, Default)]
pub struct PathBatch {
    entries: Vec<PathEntry>,
    total_bytes: u64,
}

impl PathBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a discovered path
    pub fn push(&mut self, entry: PathEntry) {
        self.total_bytes = self.total_bytes.saturating_add(entry.size);
        self.entries.push(entry);
    }

    /// Number of queued paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the sizes of queued paths
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Check the flush trigger: `count >= queue_length || bytes >= size_limit`
    pub fn should_flush(&self, queue_length: usize, size_limit: u64) -> bool {
        !self.is_empty() && (self.len() >= queue_length || self.total_bytes >= size_limit)
    }

    /// Take every queued path, leaving the batch empty
    pub fn drain(&mut self) -> Vec<PathEntry> {
        self.total_bytes = 0;
        std::mem::take(&mut self.entries)
    }
}
