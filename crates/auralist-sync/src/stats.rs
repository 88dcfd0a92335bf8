//! Counters for sync passes

use crate::engine::SyncOutcome;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one or more sync passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Records fetched from the catalog
    pub records_seen: u64,
    /// Records already identical at the destination
    pub skipped: u64,
    /// Zero-length records created remotely
    pub zero_created: u64,
    /// Records copied server-side from the old root
    pub cloned: u64,
    /// Records uploaded and verified
    pub uploaded: u64,
    /// Uploads that went through the chunked path
    pub chunked: u64,
    /// Records left pending after an error
    pub failed: u64,
    /// Bytes streamed to the remote host
    pub bytes_uploaded: u64,
    /// Wall-clock time
    pub duration: Duration,
}

impl SyncStats {
    /// Count one processed record
    pub fn record(&mut self, outcome: &SyncOutcome) {
        self.records_seen += 1;
        match outcome {
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::ZeroCreated => self.zero_created += 1,
            SyncOutcome::ClonedFromOld { .. } => self.cloned += 1,
            SyncOutcome::Uploaded { bytes, chunks } => {
                self.uploaded += 1;
                self.bytes_uploaded += bytes;
                if *chunks > 1 {
                    self.chunked += 1;
                }
            }
        }
    }

    /// Count one record that failed and stays pending
    pub fn record_failure(&mut self) {
        self.records_seen += 1;
        self.failed += 1;
    }

    /// Records that reached a verified or terminal state
    pub const fn verified(&self) -> u64 {
        self.skipped + self.zero_created + self.cloned + self.uploaded
    }

    /// Fold another pass into this one
    pub fn merge(&mut self, other: &Self) {
        self.records_seen += other.records_seen;
        self.skipped += other.skipped;
        self.zero_created += other.zero_created;
        self.cloned += other.cloned;
        self.uploaded += other.uploaded;
        self.chunked += other.chunked;
        self.failed += other.failed;
        self.bytes_uploaded += other.bytes_uploaded;
        self.duration += other.duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut stats = SyncStats::default();
        stats.record(&SyncOutcome::Skipped);
        stats.record(&SyncOutcome::Uploaded { bytes: 10, chunks: 1 });
        stats.record(&SyncOutcome::Uploaded { bytes: 30, chunks: 3 });
        stats.record_failure();

        assert_eq!(stats.records_seen, 4);
        assert_eq!(stats.verified(), 3);
        assert_eq!(stats.chunked, 1);
        assert_eq!(stats.bytes_uploaded, 40);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_merge() {
        let mut total = SyncStats {
            skipped: 1,
            duration: Duration::from_secs(1),
            ..SyncStats::default()
        };
        let pass = SyncStats {
            cloned: 2,
            failed: 1,
            duration: Duration::from_secs(2),
            ..SyncStats::default()
        };

        total.merge(&pass);
        assert_eq!(total.verified(), 3);
        assert_eq!(total.failed, 1);
        assert_eq!(total.duration, Duration::from_secs(3));
    }
}
