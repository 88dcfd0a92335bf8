//! JSON output structures for the Auralist CLI

use auralist_index::CrawlStats;
use auralist_sync::SyncStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete JSON output for one command
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResultJson<T> {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Command statistics
    pub stats: T,
}

impl<T> CommandResultJson<T> {
    /// Wrap statistics with metadata for `operation`
    pub fn new(operation: &str, host: &str, stats: T) -> Self {
        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                operation: operation.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                host: host.to_string(),
            },
            stats,
        }
    }
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Auralist version
    pub version: String,
    /// Command name
    pub operation: String,
    /// Timestamp when the output was produced
    pub timestamp: String,
    /// Local host the catalog records belong to
    pub host: String,
}

/// Crawl statistics in JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexStatsJson {
    /// Regular files visited
    pub files_seen: u64,
    /// New records persisted
    pub files_indexed: u64,
    /// Files already in the catalog
    pub files_known: u64,
    /// Files rejected by the extension allow-list
    pub files_filtered: u64,
    /// Non-regular entries skipped
    pub entries_skipped: u64,
    /// Files skipped because their path is not valid UTF-8
    pub paths_skipped: u64,
    /// Bytes of newly indexed files
    pub bytes_indexed: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl From<&CrawlStats> for IndexStatsJson {
    fn from(stats: &CrawlStats) -> Self {
        Self {
            files_seen: stats.files_seen,
            files_indexed: stats.files_indexed,
            files_known: stats.files_known,
            files_filtered: stats.files_filtered,
            entries_skipped: stats.entries_skipped,
            paths_skipped: stats.paths_skipped,
            bytes_indexed: stats.bytes_indexed,
            duration_ms: millis(stats.duration),
        }
    }
}

/// Sync statistics in JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatsJson {
    /// Records fetched from the catalog
    pub records_seen: u64,
    /// Records already identical at the destination
    pub skipped: u64,
    /// Empty files created remotely
    pub zero_created: u64,
    /// Records cloned from the old root
    pub cloned: u64,
    /// Records uploaded and verified
    pub uploaded: u64,
    /// Uploads that used chunks
    pub chunked: u64,
    /// Records left pending
    pub failed: u64,
    /// Bytes streamed to the remote host
    pub bytes_uploaded: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl From<&SyncStats> for SyncStatsJson {
    fn from(stats: &SyncStats) -> Self {
        Self {
            records_seen: stats.records_seen,
            skipped: stats.skipped,
            zero_created: stats.zero_created,
            cloned: stats.cloned,
            uploaded: stats.uploaded,
            chunked: stats.chunked,
            failed: stats.failed,
            bytes_uploaded: stats.bytes_uploaded,
            duration_ms: millis(stats.duration),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
