//! Catalog store interface and the shared record set behind both adapters

use async_trait::async_trait;
use auralist_types::{Error, FileRecord, RecordId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Persistent record store keyed by (path hash, host)
///
/// Implementations need read-your-writes consistency within one process. Uniqueness of
/// (path hash, host) is only enforced by callers checking [`exists_by_path_hash`] first, so
/// duplicate inserts are possible and must not corrupt the store.
///
/// [`exists_by_path_hash`]: CatalogStore::exists_by_path_hash
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace records by id; the last write wins
    async fn upsert(&self, records: Vec<FileRecord>) -> Result<()>;

    /// Check whether any record for `host` carries `path_hash`
    async fn exists_by_path_hash(&self, path_hash: u64, host: &str) -> Result<bool>;

    /// Find a record on `host` with the given content checksum
    async fn find_by_content_hash(&self, host: &str, crc32: u64) -> Result<Option<FileRecord>>;

    /// Page through the unverified records of `host`, oldest first
    async fn list_unverified(&self, host: &str, limit: usize, offset: usize)
        -> Result<Vec<FileRecord>>;

    /// Record a confirmed remote match
    async fn mark_verified(&self, id: RecordId, digest: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remove every record, returning how many were removed
    async fn delete_all(&self) -> Result<usize>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;
}

/// Creation order used for listing and content lookups
type Order = (DateTime<Utc>, RecordId);

/// In-memory record set with the query semantics of [`CatalogStore`]
///
/// Lookups go through per-host indexes kept in step with every mutation, so existence
/// checks are constant time and listing pending records only walks the requested page.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<FileRecord>", into = "Vec<FileRecord>")]
pub struct RecordSet {
    records: HashMap<RecordId, FileRecord>,
    by_path: HashMap<String, HashMap<u64, usize>>,
    by_content: HashMap<String, HashMap<u64, BTreeSet<Order>>>,
    pending: HashMap<String, BTreeSet<Order>>,
}

fn order(record: &FileRecord) -> Order {
    (record.created_at, record.id)
}

impl RecordSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace records by id
    pub fn upsert(&mut self, records: Vec<FileRecord>) {
        for record in records {
            if let Some(previous) = self.records.remove(&record.id) {
                self.unindex(&previous);
            }
            self.index(&record);
            self.records.insert(record.id, record);
        }
    }

    /// See [`CatalogStore::exists_by_path_hash`]
    pub fn exists_by_path_hash(&self, path_hash: u64, host: &str) -> bool {
        self.by_path
            .get(host)
            .is_some_and(|paths| paths.contains_key(&path_hash))
    }

    /// See [`CatalogStore::find_by_content_hash`]; the oldest match is returned
    pub fn find_by_content_hash(&self, host: &str, crc32: u64) -> Option<FileRecord> {
        let (_, id) = self.by_content.get(host)?.get(&crc32)?.first()?;
        self.records.get(id).cloned()
    }

    /// See [`CatalogStore::list_unverified`]
    pub fn list_unverified(&self, host: &str, limit: usize, offset: usize) -> Vec<FileRecord> {
        self.pending.get(host).map_or_else(Vec::new, |pending| {
            pending
                .iter()
                .skip(offset)
                .take(limit)
                .filter_map(|(_, id)| self.records.get(id).cloned())
                .collect()
        })
    }

    /// See [`CatalogStore::mark_verified`]
    pub fn mark_verified(&mut self, id: RecordId, digest: &str, at: DateTime<Utc>) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::catalog(format!("Record {} not found", id)))?;

        if let Some(pending) = self.pending.get_mut(&record.host_name) {
            pending.remove(&order(record));
        }
        record.strong_digest = Some(digest.to_string());
        record.verified_at = Some(at);
        record.updated_at = at;
        Ok(())
    }

    /// Remove every record
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        self.by_path.clear();
        self.by_content.clear();
        self.pending.clear();
        removed
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by id
    pub fn get(&self, id: &RecordId) -> Option<&FileRecord> {
        self.records.get(id)
    }

    fn index(&mut self, record: &FileRecord) {
        let host = &record.host_name;
        *self
            .by_path
            .entry(host.clone())
            .or_default()
            .entry(record.path_hash)
            .or_insert(0) += 1;
        self.by_content
            .entry(host.clone())
            .or_default()
            .entry(record.crc32)
            .or_default()
            .insert(order(record));
        if !record.is_verified() {
            self.pending
                .entry(host.clone())
                .or_default()
                .insert(order(record));
        }
    }

    fn unindex(&mut self, record: &FileRecord) {
        let host = &record.host_name;
        if let Some(paths) = self.by_path.get_mut(host) {
            if let Some(count) = paths.get_mut(&record.path_hash) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    paths.remove(&record.path_hash);
                }
            }
        }
        if let Some(contents) = self.by_content.get_mut(host) {
            if let Some(orders) = contents.get_mut(&record.crc32) {
                orders.remove(&order(record));
                if orders.is_empty() {
                    contents.remove(&record.crc32);
                }
            }
        }
        if let Some(pending) = self.pending.get_mut(host) {
            pending.remove(&order(record));
        }
    }
}

impl From<Vec<FileRecord>> for RecordSet {
    fn from(records: Vec<FileRecord>) -> Self {
        let mut set = Self::new();
        set.upsert(records);
        set
    }
}

impl From<RecordSet> for Vec<FileRecord> {
    fn from(set: RecordSet) -> Self {
        let mut records: Vec<FileRecord> = set.records.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_list_unverified_order_and_paging() {
        let mut set = RecordSet::new();
        set.upsert(vec![
            record("c.mp3", "studio", 3, 3),
            record("a.mp3", "studio", 1, 1),
            record("b.mp3", "studio", 2, 2),
            record("x.mp3", "mirror", 4, 0),
        ]);

        let first = set.list_unverified("studio", 2, 0);
        let names: Vec<_> = first.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3"]);

        let second = set.list_unverified("studio", 2, 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].relative_path, "c.mp3");
    }

    #[test]
    fn test_mark_verified_hides_record() {
        let mut set = RecordSet::new();
        let r = record("a.mp3", "studio", 1, 1);
        let id = r.id;
        set.upsert(vec![r]);

        set.mark_verified(id, "abc", Utc::now()).unwrap();
        assert!(set.list_unverified("studio", 10, 0).is_empty());
        assert_eq!(set.get(&id).unwrap().strong_digest.as_deref(), Some("abc"));
    }

    #[test]
    fn test_mark_verified_unknown_id() {
        let mut set = RecordSet::new();
        assert!(set.mark_verified(uuid::Uuid::new_v4(), "abc", Utc::now()).is_err());
    }

    #[test]
    fn test_find_by_content_hash_scoped_by_host() {
        let mut set = RecordSet::new();
        set.upsert(vec![
            record("old/a.mp3", "mirror", 42, 2),
            record("old/b.mp3", "mirror", 42, 1),
            record("a.mp3", "studio", 42, 0),
        ]);

        let found = set.find_by_content_hash("mirror", 42).unwrap();
        assert_eq!(found.relative_path, "old/b.mp3");
        assert!(set.find_by_content_hash("mirror", 7).is_none());
    }

    #[test]
    fn test_duplicate_inserts_are_benign() {
        let mut set = RecordSet::new();
        let a = record("a.mp3", "studio", 1, 1);
        let mut b = a.clone();
        b.id = uuid::Uuid::new_v4();
        set.upsert(vec![a.clone(), b]);
        set.upsert(vec![a.clone()]);

        assert_eq!(set.len(), 2);
        assert!(set.exists_by_path_hash(a.path_hash, "studio"));
        assert!(!set.exists_by_path_hash(a.path_hash, "mirror"));
    }

    #[test]
    fn test_replacing_a_record_moves_its_index_entries() {
        let mut set = RecordSet::new();
        let original = record("a.mp3", "studio", 1, 1);
        set.upsert(vec![original.clone()]);

        let mut moved = record("b.mp3", "studio", 2, 1);
        moved.id = original.id;
        moved.created_at = original.created_at;
        set.upsert(vec![moved.clone(), moved.clone()]);

        assert_eq!(set.len(), 1);
        assert!(!set.exists_by_path_hash(original.path_hash, "studio"));
        assert!(set.exists_by_path_hash(moved.path_hash, "studio"));
        assert!(set.find_by_content_hash("studio", 1).is_none());
        assert_eq!(set.list_unverified("studio", 10, 0).len(), 1);
    }

    #[test]
    fn test_verified_upsert_is_not_pending() {
        let mut set = RecordSet::new();
        let mut r = record("a.mp3", "studio", 1, 1);
        r.verified_at = Some(Utc::now());
        r.strong_digest = Some("abc".to_string());
        set.upsert(vec![r.clone()]);

        assert!(set.list_unverified("studio", 10, 0).is_empty());
        assert!(set.exists_by_path_hash(r.path_hash, "studio"));
        assert_eq!(set.find_by_content_hash("studio", 1).unwrap().id, r.id);
    }

    #[test]
    fn test_serde_round_trip_rebuilds_indexes() {
        let mut set = RecordSet::new();
        let a = record("a.mp3", "studio", 1, 1);
        set.upsert(vec![a.clone(), record("b.mp3", "mirror", 1, 2)]);

        let json = serde_json::to_string(&set).unwrap();
        let restored: RecordSet = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 2);
        assert!(restored.exists_by_path_hash(a.path_hash, "studio"));
        assert_eq!(restored.list_unverified("studio", 10, 0)[0].id, a.id);
    }
}
