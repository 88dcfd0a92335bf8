//! In-memory catalog for tests and dry runs

use crate::store::{CatalogStore, RecordSet};
use async_trait::async_trait;
use auralist_types::{FileRecord, RecordId, Result};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: RwLock<RecordSet>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog pre-populated with records
    pub fn with_records(records: Vec<FileRecord>) -> Self {
        Self {
            records: RwLock::new(RecordSet::from(records)),
        }
    }

    /// Fetch one record by id
    pub async fn get(&self, id: RecordId) -> Option<FileRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Snapshot every record, oldest first
    pub async fn snapshot(&self) -> Vec<FileRecord> {
        self.records.read().await.clone().into()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn upsert(&self, records: Vec<FileRecord>) -> Result<()> {
        let count = records.len();
        self.records.write().await.upsert(records);
        debug!("Upserted {} records", count);
        Ok(())
    }

    async fn exists_by_path_hash(&self, path_hash: u64, host: &str) -> Result<bool> {
        Ok(self.records.read().await.exists_by_path_hash(path_hash, host))
    }

    async fn find_by_content_hash(&self, host: &str, crc32: u64) -> Result<Option<FileRecord>> {
        Ok(self.records.read().await.find_by_content_hash(host, crc32))
    }

    async fn list_unverified(
        &self,
        host: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FileRecord>> {
        Ok(self.records.read().await.list_unverified(host, limit, offset))
    }

    async fn mark_verified(&self, id: RecordId, digest: &str, at: DateTime<Utc>) -> Result<()> {
        self.records.write().await.mark_verified(id, digest, at)
    }

    async fn delete_all(&self) -> Result<usize> {
        let removed = self.records.write().await.clear();
        info!("Deleted {} catalog records", removed);
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
