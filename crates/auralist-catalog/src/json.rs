//! JSON-file catalog backed by a snapshot and an append-only journal
//!
//! The snapshot (`catalog.json`) holds the full record set as a JSON array. Each mutation is
//! first appended as one JSON line to `catalog.json.journal` and only then applied in memory,
//! so a failed write leaves the in-memory view matching the files on disk. Opening the
//! catalog replays the journal over the snapshot and folds both back into a fresh snapshot.

use crate::store::{CatalogStore, RecordSet};
use async_trait::async_trait;
use auralist_types::{Error, FileRecord, RecordId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Journal length that always allows a compaction, whatever the record count
const MIN_COMPACTION_ENTRIES: usize = 1024;

/// One catalog mutation as stored in the journal
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Upsert {
        records: Vec<FileRecord>,
    },
    Verified {
        id: RecordId,
        digest: String,
        at: DateTime<Utc>,
    },
    Clear,
}

impl JournalEntry {
    fn apply(self, set: &mut RecordSet) {
        match self {
            Self::Upsert { records } => set.upsert(records),
            Self::Verified { id, digest, at } => {
                // Replaying onto a newer snapshot can meet ids a later clear removed.
                if let Err(e) = set.mark_verified(id, &digest, at) {
                    debug!("Skipping journal entry: {}", e);
                }
            }
            Self::Clear => {
                set.clear();
            }
        }
    }
}

#[derive(Debug)]
struct State {
    records: RecordSet,
    journal_entries: usize,
}

/// Catalog stored as a JSON snapshot plus a journal of later changes
///
/// The snapshot is only ever replaced through a temporary sibling and a rename, so a crash
/// leaves either the previous or the new snapshot, and the journal still covers the gap.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    journal_path: PathBuf,
    state: Mutex<State>,
}

impl JsonCatalog {
    /// Open the catalog at `path`, starting empty if the file does not exist
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let journal_path = sibling(&path, "journal");

        let mut records = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await.map_err(|e| Error::Catalog {
                message: format!("Failed to read catalog '{}': {}", path.display(), e),
            })?;
            let set: RecordSet = serde_json::from_slice(&data).map_err(|e| Error::Catalog {
                message: format!("Failed to parse catalog '{}': {}", path.display(), e),
            })?;
            info!("Loaded {} catalog records from {}", set.len(), path.display());
            set
        } else {
            debug!("Catalog file {} does not exist, starting empty", path.display());
            RecordSet::new()
        };
        let journal_entries = replay(&journal_path, &mut records).await?;

        let catalog = Self {
            path,
            journal_path,
            state: Mutex::new(State {
                records,
                journal_entries,
            }),
        };
        if journal_entries > 0 {
            let mut state = catalog.state.lock().await;
            catalog.compact(&mut state).await?;
            drop(state);
        }
        Ok(catalog)
    }

    /// Location of the catalog snapshot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the change journal
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Write `entry` to the journal, then apply it in memory
    async fn commit(&self, state: &mut State, entry: JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(&entry).map_err(|e| Error::Catalog {
            message: format!("Failed to serialize catalog change: {}", e),
        })?;
        line.push(b'\n');
        self.append(&line).await?;

        entry.apply(&mut state.records);
        state.journal_entries += 1;

        if state.journal_entries >= MIN_COMPACTION_ENTRIES.max(state.records.len()) {
            if let Err(e) = self.compact(state).await {
                warn!("Catalog compaction failed, keeping the journal: {}", e);
            }
        }
        Ok(())
    }

    async fn append(&self, line: &[u8]) -> Result<()> {
        let journal_error = |e: std::io::Error| Error::Catalog {
            message: format!(
                "Failed to append to catalog journal '{}': {}",
                self.journal_path.display(),
                e
            ),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await
            .map_err(journal_error)?;
        let length = file.metadata().await.map_err(journal_error)?.len();

        if let Err(e) = file.write_all(line).await {
            // A torn line would swallow the next append.
            if let Err(truncate) = file.set_len(length).await {
                warn!("Failed to trim torn journal line: {}", truncate);
            }
            return Err(journal_error(e));
        }
        file.flush().await.map_err(journal_error)
    }

    /// Fold the in-memory set into a fresh snapshot and drop the journal
    async fn compact(&self, state: &mut State) -> Result<()> {
        write_snapshot(&self.path, &state.records).await?;
        match fs::remove_file(&self.journal_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Catalog {
                    message: format!(
                        "Failed to remove catalog journal '{}': {}",
                        self.journal_path.display(),
                        e
                    ),
                })
            }
        }
        debug!(
            "Compacted {} journal entries into the catalog snapshot",
            state.journal_entries
        );
        state.journal_entries = 0;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_snapshot(path: &Path, records: &RecordSet) -> Result<()> {
    let data = serde_json::to_vec_pretty(records).map_err(|e| Error::Catalog {
        message: format!("Failed to serialize catalog: {}", e),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp = sibling(path, "tmp");
    fs::write(&tmp, data).await.map_err(|e| Error::Catalog {
        message: format!("Failed to write catalog '{}': {}", tmp.display(), e),
    })?;
    fs::rename(&tmp, path).await.map_err(|e| Error::Catalog {
        message: format!("Failed to replace catalog '{}': {}", path.display(), e),
    })?;

    debug!("Saved catalog with {} records", records.len());
    Ok(())
}

/// Apply every journal line to `records`, returning how many lines were read
///
/// An unparsable final line is a write cut short by a crash and is dropped; an unparsable
/// line anywhere else means the journal is corrupt.
async fn replay(path: &Path, records: &mut RecordSet) -> Result<usize> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(Error::Catalog {
                message: format!("Failed to read catalog journal '{}': {}", path.display(), e),
            })
        }
    };

    let mut read = 0;
    let mut lines = data
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.is_empty())
        .peekable();
    while let Some(line) = lines.next() {
        read += 1;
        match serde_json::from_slice::<JournalEntry>(line) {
            Ok(entry) => entry.apply(records),
            Err(e) if lines.peek().is_none() => {
                warn!("Dropping torn last entry of {}: {}", path.display(), e);
            }
            Err(e) => {
                return Err(Error::Catalog {
                    message: format!(
                        "Corrupt catalog journal '{}' at entry {}: {}",
                        path.display(),
                        read,
                        e
                    ),
                })
            }
        }
    }

    if read > 0 {
        info!("Replayed {} journal entries from {}", read, path.display());
    }
    Ok(read)
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn upsert(&self, records: Vec<FileRecord>) -> Result<()> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, JournalEntry::Upsert { records }).await
    }

    async fn exists_by_path_hash(&self, path_hash: u64, host: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .records
            .exists_by_path_hash(path_hash, host))
    }

    async fn find_by_content_hash(&self, host: &str, crc32: u64) -> Result<Option<FileRecord>> {
        Ok(self.state.lock().await.records.find_by_content_hash(host, crc32))
    }

    async fn list_unverified(
        &self,
        host: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FileRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .records
            .list_unverified(host, limit, offset))
    }

    async fn mark_verified(&self, id: RecordId, digest: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.records.get(&id).is_none() {
            return Err(Error::catalog(format!("Record {} not found", id)));
        }
        let entry = JournalEntry::Verified {
            id,
            digest: digest.to_string(),
            at,
        };
        self.commit(&mut state, entry).await
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.records.len();
        self.commit(&mut state, JournalEntry::Clear).await?;
        if let Err(e) = self.compact(&mut state).await {
            warn!("Catalog compaction failed, keeping the journal: {}", e);
        }
        info!("Deleted {} catalog records", removed);
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::record;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_catalog_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("catalog.json");

        let r = record("a.flac", "studio", 5, 1);
        let id = r.id;
        {
            let catalog = JsonCatalog::open(&path).await.unwrap();
            catalog.upsert(vec![r.clone()]).await.unwrap();
            catalog.mark_verified(id, "d1", Utc::now()).await.unwrap();
        }

        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(reopened.exists_by_path_hash(r.path_hash, "studio").await.unwrap());
        assert!(reopened.list_unverified("studio", 10, 0).await.unwrap().is_empty());
        assert!(!temp_dir.path().join("state").join("catalog.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_catalog_delete_all() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog
            .upsert(vec![record("a.mp3", "studio", 1, 1), record("b.mp3", "studio", 2, 2)])
            .await
            .unwrap();
        assert_eq!(catalog.delete_all().await.unwrap(), 2);

        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();

        let error = JsonCatalog::open(&path).await.unwrap_err();
        assert_eq!(error.kind(), auralist_types::ErrorKind::Catalog);
    }

    fn pending_on_disk(path: &Path) -> usize {
        let records: Vec<FileRecord> =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        records.iter().filter(|r| !r.is_verified()).count()
    }

    #[tokio::test]
    async fn test_failed_journal_write_leaves_memory_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let r = record("a.flac", "studio", 5, 1);
        let id = r.id;
        JsonCatalog::open(&path)
            .await
            .unwrap()
            .upsert(vec![r])
            .await
            .unwrap();

        let catalog = JsonCatalog::open(&path).await.unwrap();
        std::fs::create_dir(catalog.journal_path()).unwrap();

        let error = catalog.mark_verified(id, "d1", Utc::now()).await.unwrap_err();
        assert_eq!(error.kind(), auralist_types::ErrorKind::Catalog);
        assert_eq!(catalog.list_unverified("studio", 10, 0).await.unwrap().len(), 1);

        assert!(catalog
            .upsert(vec![record("b.flac", "studio", 6, 2)])
            .await
            .is_err());
        assert!(catalog.delete_all().await.is_err());
        assert_eq!(catalog.count().await.unwrap(), 1);
        assert_eq!(pending_on_disk(&path), 1);

        std::fs::remove_dir(catalog.journal_path()).unwrap();
        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.list_unverified("studio", 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_snapshot_is_covered_by_journal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        let tmp = temp_dir.path().join("catalog.json.tmp");

        let r = record("a.flac", "studio", 5, 1);
        let id = r.id;
        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog.upsert(vec![r]).await.unwrap();

        std::fs::create_dir(&tmp).unwrap();
        catalog.mark_verified(id, "d1", Utc::now()).await.unwrap();
        assert!(catalog.list_unverified("studio", 10, 0).await.unwrap().is_empty());
        assert_eq!(catalog.delete_all().await.unwrap(), 1);
        assert_eq!(catalog.count().await.unwrap(), 0);
        drop(catalog);

        std::fs::remove_dir(&tmp).unwrap();
        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
        assert!(!reopened.journal_path().exists());
    }

    #[tokio::test]
    async fn test_torn_journal_tail_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog
            .upsert(vec![record("a.mp3", "studio", 1, 1)])
            .await
            .unwrap();
        let journal = catalog.journal_path().to_path_buf();
        drop(catalog);

        let mut data = std::fs::read(&journal).unwrap();
        data.extend_from_slice(br#"{"op":"ups"#);
        std::fs::write(&journal, data).unwrap();

        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(!journal.exists());
        assert_eq!(pending_on_disk(&path), 1);
    }

    #[tokio::test]
    async fn test_corrupt_journal_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(
            temp_dir.path().join("catalog.json.journal"),
            b"{not json\n{\"op\":\"clear\"}\n",
        )
        .unwrap();

        let error = JsonCatalog::open(&path).await.unwrap_err();
        assert_eq!(error.kind(), auralist_types::ErrorKind::Catalog);
    }

    #[tokio::test]
    async fn test_journal_is_folded_into_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let records: Vec<FileRecord> = (0..1100)
            .map(|i| record(&format!("t{i}.mp3"), "studio", i, i as i64))
            .collect();
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();

        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog.upsert(records).await.unwrap();
        for id in ids {
            catalog.mark_verified(id, "d", Utc::now()).await.unwrap();
        }

        // Compaction ran mid-way: the snapshot alone already shows most records verified.
        assert!(pending_on_disk(&path) < 100);
        assert!(catalog.list_unverified("studio", 10, 0).await.unwrap().is_empty());
    }
}
