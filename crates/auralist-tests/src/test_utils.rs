//! Shared fixtures for the scenario tests

use crate::local_remote::LocalRemote;
use auralist_catalog::{CatalogStore, MemoryCatalog};
use auralist_index::{CrawlStats, Crawler, CrawlerConfig};
use auralist_remote::RemoteSession;
use auralist_sync::{SyncEngine, SyncSettings};
use auralist_types::{ChunkSize, FileRecord};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Host name the local side records in the catalog
pub const LOCAL_HOST: &str = "studio";

/// Host name the fake remote reports
pub const REMOTE_HOST: &str = "mirror";

/// Remote destination root used by every scenario
pub const DESTINATION_ROOT: &str = "/srv/media";

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Deterministic pseudo-random bytes
    Random,
    /// Short repeating structure
    Realistic,
}

/// Generate test data with specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Random => {
            let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
            (0..size)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    state.to_le_bytes()[0]
                })
                .collect()
        }
        TestDataPattern::Realistic => (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect(),
    }
}

/// A local media tree, a catalog and a fake remote host, all in one temporary directory
pub struct TestWorld {
    _temp: TempDir,
    /// Local search directory
    pub local_root: PathBuf,
    /// Fake remote host
    pub remote: LocalRemote,
    /// In-memory catalog shared by crawler and engine
    pub catalog: Arc<MemoryCatalog>,
}

impl TestWorld {
    /// Create an empty world
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("temp dir: {}", e));
        let local_root = temp.path().join("local");
        let remote_root = temp.path().join("remote");
        fs::create_dir_all(&local_root).unwrap_or_else(|e| panic!("local root: {}", e));
        fs::create_dir_all(remote_root.join("tmp")).unwrap_or_else(|e| panic!("remote root: {}", e));

        Self {
            _temp: temp,
            local_root,
            remote: LocalRemote::new(remote_root, REMOTE_HOST),
            catalog: Arc::new(MemoryCatalog::new()),
        }
    }

    /// Write a file under the local search directory
    pub fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.local_root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create {:?}: {}", parent, e));
        }
        fs::write(&path, data).unwrap_or_else(|e| panic!("write {:?}: {}", path, e));
        path
    }

    /// Local path of a relative file
    pub fn local(&self, relative: &str) -> PathBuf {
        self.local_root.join(relative)
    }

    /// Crawl the local search directory into the catalog
    pub async fn index(&self) -> CrawlStats {
        let crawler = Crawler::new(
            self.catalog.clone(),
            CrawlerConfig::new(&self.local_root, LOCAL_HOST),
        );
        crawler
            .index()
            .await
            .unwrap_or_else(|e| panic!("index failed: {}", e))
    }

    /// Pending records of the local host
    pub async fn pending(&self) -> Vec<FileRecord> {
        self.catalog
            .list_unverified(LOCAL_HOST, 1000, 0)
            .await
            .unwrap_or_else(|e| panic!("list failed: {}", e))
    }

    /// Pending record for one relative path
    pub async fn pending_record(&self, relative: &str) -> FileRecord {
        self.pending()
            .await
            .into_iter()
            .find(|record| record.relative_path == relative)
            .unwrap_or_else(|| panic!("no pending record for {}", relative))
    }

    /// Engine talking to the fake remote directly
    pub fn engine(&self, settings: SyncSettings) -> SyncEngine {
        self.engine_with(Arc::new(self.remote.clone()), settings)
    }

    /// Engine talking to the fake remote through another session
    pub fn engine_with(&self, session: Arc<dyn RemoteSession>, settings: SyncSettings) -> SyncEngine {
        SyncEngine::new(self.catalog.clone(), session, settings, LOCAL_HOST)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine settings for scenarios; `chunk_size` is both threshold and piece size
pub fn settings(chunk_size: u64) -> SyncSettings {
    SyncSettings {
        destination_root: DESTINATION_ROOT.to_string(),
        old_root: None,
        chunk_size: ChunkSize::new(chunk_size).unwrap_or_else(|e| panic!("chunk size: {}", e)),
        upload_timeout: Duration::from_secs(600),
        poll_interval: Duration::from_millis(20),
        list_limit: 100,
        temp_directory: "/tmp".to_string(),
    }
}

/// Remote path of a relative file under the destination root
pub fn destination(relative: &str) -> String {
    format!("{}/{}", DESTINATION_ROOT, relative)
}
