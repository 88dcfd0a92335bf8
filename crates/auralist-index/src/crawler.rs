//! Directory crawler that batches new paths and hashes them concurrently

use crate::hash::{extension_of, relative_path, HashService};
use auralist_catalog::CatalogStore;
use auralist_types::{BatchLimits, Error, FileRecord, PathBatch, PathEntry, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Crawler settings
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Search directory to walk
    pub root: PathBuf,
    /// Batch flush thresholds
    pub limits: BatchLimits,
    /// Lowercased extension allow-list; empty admits everything
    pub extensions: Vec<String>,
    /// Host name recorded on new records
    pub host: String,
}

impl CrawlerConfig {
    /// Settings with default limits and no extension filter
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, host: S) -> Self {
        Self {
            root: root.into(),
            limits: BatchLimits::default(),
            extensions: Vec::new(),
            host: host.into(),
        }
    }

    fn admits(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|e| e == extension)
    }
}

/// Counters for one crawl
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Regular files visited
    pub files_seen: u64,
    /// New records persisted
    pub files_indexed: u64,
    /// Files already present for this host
    pub files_known: u64,
    /// Files rejected by the extension allow-list
    pub files_filtered: u64,
    /// Non-regular entries skipped (symlinks, sockets, ...)
    pub entries_skipped: u64,
    /// Files skipped because their path is not valid UTF-8
    pub paths_skipped: u64,
    /// Bytes of newly indexed files
    pub bytes_indexed: u64,
    /// Batches flushed
    pub batches: u64,
    /// Wall time of the crawl
    pub duration: Duration,
}

enum WalkItem {
    File(PathEntry),
    Filtered,
    Skipped,
    Unencodable,
}

/// Walks a search directory and persists a record for every newly discovered file
///
/// Symbolic links are never followed and never indexed. Files whose path is not valid UTF-8
/// are skipped with a warning, since no record could name them faithfully. Any stat or read
/// error aborts the crawl; batches flushed before the error stay committed.
pub struct Crawler {
    catalog: Arc<dyn CatalogStore>,
    config: CrawlerConfig,
}

impl Crawler {
    /// Create a crawler writing into `catalog`
    pub fn new(catalog: Arc<dyn CatalogStore>, config: CrawlerConfig) -> Self {
        Self { catalog, config }
    }

    /// Index every regular file under the configured root
    pub async fn index(&self) -> Result<CrawlStats> {
        let start = Instant::now();
        let mut stats = CrawlStats::default();
        let mut batch = PathBatch::new();

        info!("Indexing {}", self.config.root.display());
        let (tx, mut rx) = mpsc::channel(self.config.limits.queue_length.max(1) * 2);
        let walker = self.spawn_walker(tx);

        while let Some(item) = rx.recv().await {
            match item? {
                WalkItem::Skipped => stats.entries_skipped += 1,
                WalkItem::Unencodable => {
                    stats.files_seen += 1;
                    stats.paths_skipped += 1;
                }
                WalkItem::Filtered => {
                    stats.files_seen += 1;
                    stats.files_filtered += 1;
                }
                WalkItem::File(entry) => {
                    stats.files_seen += 1;
                    let path_hash = HashService::path_hash(&entry.relative_path);
                    if self
                        .catalog
                        .exists_by_path_hash(path_hash, &self.config.host)
                        .await?
                    {
                        stats.files_known += 1;
                        continue;
                    }

                    batch.push(entry);
                    if batch.should_flush(
                        self.config.limits.queue_length,
                        self.config.limits.size_limit,
                    ) {
                        self.flush(&mut batch, &mut stats).await?;
                    }
                }
            }
        }

        walker
            .await
            .map_err(|e| Error::other(format!("Directory walker failed: {}", e)))?;

        if !batch.is_empty() {
            self.flush(&mut batch, &mut stats).await?;
        }

        stats.duration = start.elapsed();
        info!(
            "Indexed {} new files ({} already known, {} filtered, {} unreadable names) in {} batches",
            stats.files_indexed,
            stats.files_known,
            stats.files_filtered,
            stats.paths_skipped,
            stats.batches
        );
        Ok(stats)
    }

    fn spawn_walker(&self, tx: mpsc::Sender<Result<WalkItem>>) -> tokio::task::JoinHandle<()> {
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            for entry in WalkDir::new(&config.root).follow_links(false) {
                let item = match entry {
                    Ok(entry) if entry.file_type().is_dir() => continue,
                    Ok(entry) if !entry.file_type().is_file() => {
                        debug!("Skipping non-regular entry {}", entry.path().display());
                        Ok(WalkItem::Skipped)
                    }
                    Ok(entry) if entry.path().to_str().is_none() => {
                        warn!(
                            path = %entry.path().display(),
                            "Skipping file whose path is not valid UTF-8"
                        );
                        Ok(WalkItem::Unencodable)
                    }
                    Ok(entry) => {
                        let path = entry.path().to_path_buf();
                        if config.admits(&extension_of(&path)) {
                            entry
                                .metadata()
                                .map_err(|e| walk_error(&path, &e.into()))
                                .and_then(|metadata| {
                                    Ok(WalkItem::File(PathEntry {
                                        relative_path: relative_path(&config.root, &path)?,
                                        path,
                                        size: metadata.len(),
                                    }))
                                })
                        } else {
                            Ok(WalkItem::Filtered)
                        }
                    }
                    Err(e) => {
                        let path = e
                            .path()
                            .map_or_else(|| config.root.clone(), |p| p.to_path_buf());
                        Err(walk_error(&path, &e.into()))
                    }
                };

                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    return;
                }
            }
        })
    }

    async fn flush(&self, batch: &mut PathBatch, stats: &mut CrawlStats) -> Result<()> {
        let bytes = batch.total_bytes();
        let entries = batch.drain();
        let count = entries.len();
        debug!("Flushing batch of {} files ({} bytes)", count, bytes);

        let mut tasks = JoinSet::new();
        for entry in entries {
            let root = self.config.root.clone();
            let host = self.config.host.clone();
            tasks.spawn_blocking(move || {
                HashService::describe(&root, &entry.path, entry.size, &host)
            });
        }

        let mut records: Vec<FileRecord> = Vec::with_capacity(count);
        while let Some(joined) = tasks.join_next().await {
            let record =
                joined.map_err(|e| Error::other(format!("Hash task failed: {}", e)))??;
            records.push(record);
        }

        self.catalog.upsert(records).await?;
        stats.batches += 1;
        stats.files_indexed += count as u64;
        stats.bytes_indexed += bytes;
        Ok(())
    }
}

fn walk_error(path: &std::path::Path, error: &std::io::Error) -> Error {
    warn!("Aborting crawl at {}: {}", path.display(), error);
    Error::local_io(path, error)
}
