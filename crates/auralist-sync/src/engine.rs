//! Per-record synchronization engine
//!
//! Each pending record walks a fixed decision order:
//!
//! 1. the destination already holds identical content: **skipped**
//! 2. the local file is empty: an empty remote file is **zero-created**
//! 3. an old root holds a copy with the same checksum and digest: **cloned** server-side
//! 4. otherwise the file is **uploaded**, whole or in chunks, and verified by digest
//!
//! Only confirmed outcomes are written back to the catalog; a record whose processing fails
//! in any way stays pending for a later pass.

use crate::chunked::{local_digest, ChunkedTransfer};
use crate::stats::SyncStats;
use auralist_catalog::CatalogStore;
use auralist_config::Config;
use auralist_remote::{RemoteOps, RemoteSession};
use auralist_types::{
    remote_parent, ChunkSize, Error, FileRecord, Result, SyncState, EMPTY_SHA256,
};
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Buffer size for whole-file uploads
const UPLOAD_BUFFER_SIZE: usize = 1024 * 1024;

/// Settings the engine runs with
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Remote directory mirroring the local search directory
    pub destination_root: String,
    /// Remote directory of a previous layout to clone from
    pub old_root: Option<String>,
    /// Chunk threshold and chunk size
    pub chunk_size: ChunkSize,
    /// Time limit for one whole-file upload
    pub upload_timeout: Duration,
    /// Sleep between passes that found nothing to do
    pub poll_interval: Duration,
    /// Records fetched per pass
    pub list_limit: usize,
    /// Remote directory for chunk files
    pub temp_directory: String,
}

impl SyncSettings {
    /// Settings from the `[remote]` and `[sync]` configuration sections
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            destination_root: config.remote.destination_root.clone(),
            old_root: config.remote.old_root().map(str::to_string),
            chunk_size: config.sync.chunk_size()?,
            upload_timeout: config.sync.upload_timeout(),
            poll_interval: config.sync.poll_interval(),
            list_limit: config.sync.list_limit,
            temp_directory: config.sync.temp_directory.clone(),
        })
    }
}

/// How a record reached the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Destination already identical
    Skipped,
    /// Empty file created remotely
    ZeroCreated,
    /// Copied on the remote host from the old root
    ClonedFromOld {
        /// Old-root path the copy came from
        from: String,
    },
    /// Uploaded and verified
    Uploaded {
        /// Bytes streamed
        bytes: u64,
        /// Sinks used; 1 for a whole-file upload
        chunks: u32,
    },
}

impl SyncOutcome {
    /// The path taken out of [`SyncState::Pending`]
    pub const fn state(&self) -> SyncState {
        match self {
            Self::Skipped => SyncState::Skipped,
            Self::ZeroCreated => SyncState::ZeroCreated,
            Self::ClonedFromOld { .. } => SyncState::ClonedFromOld,
            Self::Uploaded { .. } => SyncState::Uploaded,
        }
    }

    /// The state the record ends in
    pub const fn final_state(&self) -> SyncState {
        match self {
            Self::Skipped => SyncState::Skipped,
            Self::ZeroCreated => SyncState::ZeroCreated,
            Self::ClonedFromOld { .. } | Self::Uploaded { .. } => SyncState::Verified,
        }
    }
}

/// Lazily computed digest of the local file, shared by every step of one record
struct LocalDigest<'a> {
    path: &'a Path,
    value: Option<String>,
}

impl<'a> LocalDigest<'a> {
    const fn new(path: &'a Path) -> Self {
        Self { path, value: None }
    }

    async fn get(&mut self) -> Result<String> {
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        let value = local_digest(self.path).await?;
        self.value = Some(value.clone());
        Ok(value)
    }
}

/// Drives pending catalog records to the remote destination one at a time
pub struct SyncEngine {
    catalog: Arc<dyn CatalogStore>,
    session: Arc<dyn RemoteSession>,
    settings: SyncSettings,
    local_host: String,
    remote_host: Mutex<Option<String>>,
    offset: AtomicUsize,
}

impl SyncEngine {
    /// Create an engine syncing the records of `local_host`
    pub fn new<S: Into<String>>(
        catalog: Arc<dyn CatalogStore>,
        session: Arc<dyn RemoteSession>,
        settings: SyncSettings,
        local_host: S,
    ) -> Self {
        Self {
            catalog,
            session,
            settings,
            local_host: local_host.into(),
            remote_host: Mutex::new(None),
            offset: AtomicUsize::new(0),
        }
    }

    /// Engine settings
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Bring one record to the destination and record the result in the catalog
    pub async fn process(&self, record: &FileRecord) -> Result<SyncOutcome> {
        let local = record.local_path();
        let remote = record.remote_path(&self.settings.destination_root);

        let result = self.transition(record, &local, &remote).await;
        if let Err(e) = &result {
            if e.is_transport() {
                self.remote_host.lock().await.take();
            }
        }
        result
    }

    async fn transition(&self, record: &FileRecord, local: &Path, remote: &str) -> Result<SyncOutcome> {
        let size = tokio::fs::metadata(local)
            .await
            .map_err(|e| Error::local_io(local, &e))?
            .len();
        let mut digest = LocalDigest::new(local);

        let exists = self.session.file_exists(remote).await?;
        if exists {
            let remote_digest = self.session.digest(remote).await?;
            if remote_digest == digest.get().await? {
                self.mark(record, &remote_digest).await?;
                return Ok(SyncOutcome::Skipped);
            }
            info!(remote = %remote, "Destination differs from local copy, replacing it");
        }

        if size == 0 {
            self.ensure_parent(remote).await?;
            if exists {
                self.session.remove(remote).await?;
            }
            self.session.touch(remote).await?;
            self.mark(record, EMPTY_SHA256).await?;
            return Ok(SyncOutcome::ZeroCreated);
        }

        if let Some(old_root) = self.settings.old_root.as_deref() {
            if let Some(from) = self.clone_source(record, old_root, &mut digest).await? {
                self.ensure_parent(remote).await?;
                self.session.copy(&from, remote).await?;
                self.mark(record, &digest.get().await?).await?;
                return Ok(SyncOutcome::ClonedFromOld { from });
            }
        }

        self.ensure_parent(remote).await?;
        if self.settings.chunk_size.requires_chunking(size) {
            let local_digest = digest.get().await?;
            let report = ChunkedTransfer::new(self.session.clone(), self.settings.temp_directory.as_str())
                .send_with_digest(local, remote, self.settings.chunk_size, &local_digest)
                .await?;
            self.mark(record, &report.digest).await?;
            return Ok(SyncOutcome::Uploaded {
                bytes: report.bytes,
                chunks: report.chunks,
            });
        }

        let seconds = self.settings.upload_timeout.as_secs();
        tokio::time::timeout(
            self.settings.upload_timeout,
            self.upload_whole(local, remote, size),
        )
        .await
        .map_err(|_| Error::Timeout { seconds })??;

        let remote_digest = self.session.digest(remote).await?;
        let local_digest = digest.get().await?;
        if remote_digest != local_digest {
            return Err(Error::VerificationMismatch {
                path: remote.to_string(),
                local: local_digest,
                remote: remote_digest,
            });
        }
        self.mark(record, &remote_digest).await?;
        Ok(SyncOutcome::Uploaded {
            bytes: size,
            chunks: 1,
        })
    }

    /// Old-root path holding the same content as `record`, if any
    async fn clone_source(
        &self,
        record: &FileRecord,
        old_root: &str,
        digest: &mut LocalDigest<'_>,
    ) -> Result<Option<String>> {
        let remote_host = self.remote_host().await?;
        let Some(candidate) = self
            .catalog
            .find_by_content_hash(&remote_host, record.crc32)
            .await?
        else {
            return Ok(None);
        };

        let old_path = candidate.remote_path(old_root);
        if !self.session.file_exists(&old_path).await? {
            debug!(old = %old_path, "Catalogued old copy is gone");
            return Ok(None);
        }
        if self.session.digest(&old_path).await? == digest.get().await? {
            Ok(Some(old_path))
        } else {
            info!(
                old = %old_path,
                crc32 = record.crc32,
                "Checksum collision with different content, uploading instead"
            );
            Ok(None)
        }
    }

    async fn remote_host(&self) -> Result<String> {
        let mut cached = self.remote_host.lock().await;
        if let Some(name) = cached.as_ref() {
            return Ok(name.clone());
        }
        let name = self.session.hostname().await?;
        info!(remote_host = %name, "Resolved remote host name");
        *cached = Some(name.clone());
        Ok(name)
    }

    async fn ensure_parent(&self, remote: &str) -> Result<()> {
        match remote_parent(remote) {
            Some(parent) => self.session.ensure_dir(parent).await,
            None => Ok(()),
        }
    }

    async fn upload_whole(&self, local: &Path, remote: &str, size: u64) -> Result<()> {
        let file = tokio::fs::File::open(local)
            .await
            .map_err(|e| Error::local_io(local, &e))?;
        let mut reader = file.take(size);
        let mut sink = self.session.open_sink(remote, size).await?;
        let mut buffer = vec![0u8; UPLOAD_BUFFER_SIZE];

        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| Error::local_io(local, &e))?;
            if read == 0 {
                break;
            }
            sink.write(&buffer[..read]).await?;
        }
        sink.finish().await
    }

    async fn mark(&self, record: &FileRecord, digest: &str) -> Result<()> {
        self.catalog.mark_verified(record.id, digest, Utc::now()).await
    }

    /// Fetch one batch of pending records and process it
    ///
    /// Records that fail stay pending and are stepped over until the sweep runs dry, after
    /// which the next pass starts again from the oldest pending record.
    pub async fn run_once(&self) -> Result<SyncStats> {
        let start = Instant::now();
        let offset = self.offset.load(Ordering::SeqCst);
        let records = self
            .catalog
            .list_unverified(&self.local_host, self.settings.list_limit, offset)
            .await?;

        let mut stats = SyncStats::default();
        if records.is_empty() {
            if offset > 0 {
                debug!(offset, "Sweep complete, restarting from the oldest pending record");
            }
            self.offset.store(0, Ordering::SeqCst);
            return Ok(stats);
        }

        info!(count = records.len(), offset, "Processing pending records");
        for record in &records {
            match self.process(record).await {
                Ok(outcome) => {
                    info!(
                        path = %record.relative_path,
                        state = %outcome.final_state(),
                        "Record {}",
                        outcome.state()
                    );
                    stats.record(&outcome);
                }
                Err(e) => {
                    self.log_failure(record, &e);
                    stats.record_failure();
                }
            }
        }

        let failed = usize::try_from(stats.failed).unwrap_or(usize::MAX);
        self.offset.fetch_add(failed, Ordering::SeqCst);
        stats.duration = start.elapsed();
        Ok(stats)
    }

    fn log_failure(&self, record: &FileRecord, error: &Error) {
        let local: PathBuf = record.local_path();
        let remote = record.remote_path(&self.settings.destination_root);
        match error {
            Error::RemoteCommand { command, .. } => warn!(
                local = %local.display(),
                remote = %remote,
                command = %command,
                "Record left pending: {}",
                error
            ),
            _ => warn!(
                local = %local.display(),
                remote = %remote,
                "Record left pending: {}",
                error
            ),
        }
    }

    /// Process pending records until `shutdown` completes
    ///
    /// Passes that find nothing to do are followed by the poll interval. Catalog failures are
    /// logged and retried; only fatal errors end the loop early.
    pub async fn run<F>(&self, shutdown: F) -> Result<SyncStats>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut total = SyncStats::default();
        info!(
            host = %self.local_host,
            destination = %self.settings.destination_root,
            "Sync loop started"
        );

        loop {
            let pass = tokio::select! {
                () = &mut shutdown => break,
                pass = self.run_once() => pass,
            };

            let idle = match pass {
                Ok(stats) => {
                    let idle = stats.records_seen == 0;
                    if !idle {
                        info!(
                            verified = stats.verified(),
                            failed = stats.failed,
                            bytes = stats.bytes_uploaded,
                            "Pass finished in {:?}",
                            stats.duration
                        );
                    }
                    total.merge(&stats);
                    idle
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Sync pass failed: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        info!(verified = total.verified(), failed = total.failed, "Sync loop stopped");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemote;
    use auralist_catalog::MemoryCatalog;
    use auralist_index::HashService;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        catalog: Arc<MemoryCatalog>,
        remote: MemoryRemote,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                catalog: Arc::new(MemoryCatalog::new()),
                remote: MemoryRemote::new(),
            }
        }

        async fn add(&self, relative: &str, data: &[u8]) -> FileRecord {
            let path = self.temp.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, data).unwrap();
            let record =
                HashService::describe(self.temp.path(), &path, data.len() as u64, "studio").unwrap();
            self.catalog.upsert(vec![record.clone()]).await.unwrap();
            record
        }

        fn engine(&self, settings: SyncSettings) -> SyncEngine {
            SyncEngine::new(
                self.catalog.clone(),
                Arc::new(self.remote.clone()),
                settings,
                "studio",
            )
        }
    }

    fn settings(chunk_size: u64) -> SyncSettings {
        SyncSettings {
            destination_root: "/srv/media".to_string(),
            old_root: None,
            chunk_size: ChunkSize::new(chunk_size).unwrap(),
            upload_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(10),
            list_limit: 100,
            temp_directory: "/tmp".to_string(),
        }
    }

    #[tokio::test]
    async fn test_small_file_is_uploaded_and_verified() {
        let fixture = Fixture::new();
        let record = fixture.add("a.txt", b"hello").await;
        let engine = fixture.engine(settings(1000));

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Uploaded { bytes: 5, chunks: 1 });
        assert_eq!(outcome.final_state(), SyncState::Verified);
        assert_eq!(fixture.remote.file("/srv/media/a.txt").unwrap(), b"hello");
        assert_eq!(fixture.remote.sinks(), 1);
        assert_eq!(fixture.remote.count("sha256sum"), 1);

        let stored = fixture.catalog.get(record.id).await.unwrap();
        assert!(stored.is_verified());
        assert_eq!(
            stored.strong_digest.as_deref(),
            Some(HashService::strong_digest_bytes(b"hello").as_str())
        );
    }

    #[tokio::test]
    async fn test_identical_destination_is_skipped() {
        let fixture = Fixture::new();
        let record = fixture.add("album/track.flac", b"same bytes").await;
        fixture.remote.put("/srv/media/album/track.flac", b"same bytes");
        let engine = fixture.engine(settings(1000));

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(fixture.remote.sinks(), 0);
        assert!(fixture.catalog.get(record.id).await.unwrap().is_verified());
    }

    #[tokio::test]
    async fn test_different_destination_is_replaced() {
        let fixture = Fixture::new();
        let record = fixture.add("a.txt", b"new").await;
        fixture.remote.put("/srv/media/a.txt", b"old content");
        let engine = fixture.engine(settings(1000));

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome.state(), SyncState::Uploaded);
        assert_eq!(fixture.remote.file("/srv/media/a.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_empty_file_is_zero_created_below_any_threshold() {
        let fixture = Fixture::new();
        let record = fixture.add("deep/dir/empty.mp3", b"").await;
        let engine = fixture.engine(settings(1));

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::ZeroCreated);
        assert_eq!(fixture.remote.file("/srv/media/deep/dir/empty.mp3").unwrap(), b"");
        assert_eq!(fixture.remote.count("mkdir"), 1);
        assert_eq!(fixture.remote.count("touch"), 1);
        assert_eq!(fixture.remote.sinks(), 0);
        assert_eq!(
            fixture
                .catalog
                .get(record.id)
                .await
                .unwrap()
                .strong_digest
                .as_deref(),
            Some(EMPTY_SHA256)
        );
    }

    #[tokio::test]
    async fn test_large_file_takes_chunked_path() {
        let fixture = Fixture::new();
        let data: Vec<u8> = (0..450u32).map(|i| (i % 7) as u8).collect();
        let record = fixture.add("b.bin", &data).await;
        let engine = fixture.engine(settings(100));

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Uploaded { bytes: 450, chunks: 5 });
        assert_eq!(fixture.remote.sinks(), 5);
        assert_eq!(fixture.remote.count("cat"), 1);
        assert_eq!(fixture.remote.count("rm"), 5);
        assert_eq!(fixture.remote.count("sha256sum"), 1);
        assert_eq!(fixture.remote.file("/srv/media/b.bin").unwrap(), data);
    }

    #[tokio::test]
    async fn test_clone_from_old_root() {
        let fixture = Fixture::new();
        let first = fixture.add("c.mp3", b"shared audio").await;
        let second = fixture.add("d.mp3", b"other audio").await;

        let mut old = first.clone();
        old.id = uuid::Uuid::new_v4();
        old.host_name = "mirror".to_string();
        old.relative_path = "archive/c.mp3".to_string();
        fixture.catalog.upsert(vec![old]).await.unwrap();
        fixture.remote.put("/srv/old/archive/c.mp3", b"shared audio");

        let mut settings = settings(1000);
        settings.old_root = Some("/srv/old".to_string());
        let engine = fixture.engine(settings);

        let outcome = engine.process(&first).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::ClonedFromOld {
                from: "/srv/old/archive/c.mp3".to_string()
            }
        );
        assert_eq!(fixture.remote.count("cp"), 1);
        assert_eq!(fixture.remote.sinks(), 0);
        assert_eq!(fixture.remote.file("/srv/media/c.mp3").unwrap(), b"shared audio");

        engine.process(&second).await.unwrap();
        assert_eq!(fixture.remote.count("hostname"), 1);
    }

    #[tokio::test]
    async fn test_checksum_collision_falls_through_to_upload() {
        let fixture = Fixture::new();
        let record = fixture.add("c.mp3", b"local audio").await;

        let mut old = record.clone();
        old.id = uuid::Uuid::new_v4();
        old.host_name = "mirror".to_string();
        fixture.catalog.upsert(vec![old]).await.unwrap();
        fixture.remote.put("/srv/old/c.mp3", b"different audio");

        let mut settings = settings(1000);
        settings.old_root = Some("/srv/old".to_string());
        let engine = fixture.engine(settings);

        let outcome = engine.process(&record).await.unwrap();

        assert_eq!(outcome.state(), SyncState::Uploaded);
        assert_eq!(fixture.remote.count("cp"), 0);
        assert_eq!(fixture.remote.file("/srv/media/c.mp3").unwrap(), b"local audio");
    }

    #[tokio::test]
    async fn test_mismatch_leaves_record_pending() {
        let fixture = Fixture::new();
        let record = fixture.add("a.txt", b"hello").await;
        fixture.remote.corrupt_sinks();
        let engine = fixture.engine(settings(1000));

        let error = engine.process(&record).await.unwrap_err();

        assert!(matches!(error, Error::VerificationMismatch { .. }));
        assert!(!fixture.catalog.get(record.id).await.unwrap().is_verified());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upload_times_out() {
        let fixture = Fixture::new();
        let record = fixture.add("a.txt", b"hello").await;
        fixture.remote.stall_sinks();
        let mut settings = settings(1000);
        settings.upload_timeout = Duration::from_secs(5);
        let engine = fixture.engine(settings);

        let error = engine.process(&record).await.unwrap_err();
        assert!(matches!(error, Error::Timeout { seconds: 5 }));
        assert_eq!(fixture.remote.sinks(), 1);
        assert_eq!(fixture.remote.count("sha256sum"), 0);
        assert!(fixture.remote.file("/srv/media/a.txt").is_none());
        assert!(!fixture.catalog.get(record.id).await.unwrap().is_verified());

        let stats = engine.run_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.uploaded, 0);
        assert_eq!(
            fixture
                .catalog
                .list_unverified("studio", 10, 0)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_command_leaves_record_pending() {
        let fixture = Fixture::new();
        let record = fixture.add("a.txt", b"hello").await;
        fixture.remote.fail_command("mkdir", 1);
        let engine = fixture.engine(settings(1000));

        let error = engine.process(&record).await.unwrap_err();

        assert!(matches!(error, Error::RemoteCommand { .. }));
        assert_eq!(fixture.remote.sinks(), 0);
        assert!(!fixture.catalog.get(record.id).await.unwrap().is_verified());
    }

    #[tokio::test]
    async fn test_run_once_steps_over_failures() {
        let fixture = Fixture::new();
        fixture.add("ok.txt", b"fine").await;
        let broken = fixture.add("gone.txt", b"soon deleted").await;
        std::fs::remove_file(broken.local_path()).unwrap();
        let engine = fixture.engine(settings(1000));

        let first = engine.run_once().await.unwrap();
        assert_eq!(first.records_seen, 2);
        assert_eq!(first.uploaded, 1);
        assert_eq!(first.failed, 1);

        let second = engine.run_once().await.unwrap();
        assert_eq!(second.records_seen, 0);

        let third = engine.run_once().await.unwrap();
        assert_eq!(third.records_seen, 1);
        assert_eq!(third.failed, 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let fixture = Fixture::new();
        fixture.add("a.txt", b"one").await;
        fixture.add("b.txt", b"two").await;
        let engine = fixture.engine(settings(1000));

        let total = engine
            .run(tokio::time::sleep(Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(total.uploaded, 2);
        assert!(fixture
            .catalog
            .list_unverified("studio", 10, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.remote.destination_root = "/srv/media".to_string();
        config.remote.old_root = Some("  ".to_string());
        config.sync.chunk_size = 10;

        let settings = SyncSettings::from_config(&config).unwrap();
        assert_eq!(settings.chunk_size.get(), 10);
        assert!(settings.old_root.is_none());
        assert_eq!(settings.list_limit, 100);
    }
}
