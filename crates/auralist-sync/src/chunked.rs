//! Chunked uploads for files above the chunk threshold
//!
//! A large file is split into fixed-size pieces, each written to its own temporary remote
//! file through a sink. The pieces share a random prefix and a zero-padded sequence number,
//! so one `cat prefix*` on the remote side rebuilds the file in order. The transfer only
//! counts as done once the remote digest of the rebuilt file equals the local digest.

use auralist_index::HashService;
use auralist_remote::{RemoteOps, RemoteSession};
use auralist_types::{ChunkSize, Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Upper bound on the buffer reserved up front for one chunk
const INITIAL_CHUNK_CAPACITY: u64 = 8 * 1024 * 1024;

/// Reads a stream as consecutive chunks of an exact size
///
/// Every chunk except the last is exactly `chunk_size` bytes long; the last one holds the
/// remainder and is never empty.
#[derive(Debug)]
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wrap a reader
    pub fn new(reader: R, chunk_size: ChunkSize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.get(),
            finished: false,
        }
    }

    /// Read the next chunk, or `None` once the stream is exhausted
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let capacity = usize::try_from(self.chunk_size.min(INITIAL_CHUNK_CAPACITY)).unwrap_or(0);
        let mut chunk = Vec::with_capacity(capacity);
        let read = (&mut self.reader)
            .take(self.chunk_size)
            .read_to_end(&mut chunk)
            .await?;

        if (read as u64) < self.chunk_size {
            self.finished = true;
        }
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

/// Summary of one chunked transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Number of chunks written
    pub chunks: u32,
    /// Bytes written across all chunks
    pub bytes: u64,
    /// Verified SHA-256 of the rebuilt remote file
    pub digest: String,
    /// Chunk files that could not be removed afterwards
    pub cleanup_failures: u32,
    /// Wall-clock time of the transfer
    pub duration: Duration,
}

/// Sends one file as a sequence of remote chunk files
pub struct ChunkedTransfer {
    session: Arc<dyn RemoteSession>,
    temp_directory: String,
}

impl ChunkedTransfer {
    /// Create a transfer writing its chunk files under `temp_directory` on the remote host
    pub fn new<S: Into<String>>(session: Arc<dyn RemoteSession>, temp_directory: S) -> Self {
        Self {
            session,
            temp_directory: temp_directory.into(),
        }
    }

    /// Upload `local` to `remote` in chunks of `chunk_size`, hashing the local file first
    pub async fn send(&self, local: &Path, remote: &str, chunk_size: ChunkSize) -> Result<ChunkReport> {
        let digest = local_digest(local).await?;
        self.send_with_digest(local, remote, chunk_size, &digest).await
    }

    /// Upload `local` to `remote` in chunks, verifying against an already known local digest
    pub async fn send_with_digest(
        &self,
        local: &Path,
        remote: &str,
        chunk_size: ChunkSize,
        local_digest: &str,
    ) -> Result<ChunkReport> {
        let start = Instant::now();
        let prefix = self.chunk_prefix();
        info!(
            local = %local.display(),
            remote = %remote,
            chunk_size = chunk_size.get(),
            "Starting chunked upload"
        );

        let file = tokio::fs::File::open(local)
            .await
            .map_err(|e| Error::local_io(local, &e))?;
        let mut reader = ChunkReader::new(file, chunk_size);
        let mut written: Vec<String> = Vec::new();
        let mut bytes = 0u64;

        let upload = async {
            while let Some(chunk) = reader
                .next_chunk()
                .await
                .map_err(|e| Error::local_io(local, &e))?
            {
                let name = chunk_name(&prefix, written.len() + 1);
                let mut sink = self.session.open_sink(&name, chunk.len() as u64).await?;
                written.push(name.clone());
                sink.write(&chunk).await?;
                sink.finish().await?;
                bytes += chunk.len() as u64;
                debug!(chunk = %name, bytes = chunk.len(), "Chunk written");
            }
            self.session.concat(&prefix, remote).await
        }
        .await;

        let cleanup_failures = self.cleanup(&written).await;
        upload?;

        let remote_digest = self.session.digest(remote).await?;
        if remote_digest != local_digest {
            return Err(Error::VerificationMismatch {
                path: remote.to_string(),
                local: local_digest.to_string(),
                remote: remote_digest,
            });
        }

        let report = ChunkReport {
            chunks: u32::try_from(written.len()).unwrap_or(u32::MAX),
            bytes,
            digest: remote_digest,
            cleanup_failures,
            duration: start.elapsed(),
        };
        info!(
            remote = %remote,
            chunks = report.chunks,
            bytes = report.bytes,
            "Chunked upload verified in {:?}",
            report.duration
        );
        Ok(report)
    }

    fn chunk_prefix(&self) -> String {
        format!(
            "{}/auralist.tmp.{}.part",
            self.temp_directory.trim_end_matches('/'),
            uuid::Uuid::new_v4().simple()
        )
    }

    async fn cleanup(&self, chunks: &[String]) -> u32 {
        let mut failures = 0;
        for chunk in chunks {
            if let Err(e) = self.session.remove(chunk).await {
                warn!(chunk = %chunk, "Failed to remove chunk file: {}", e);
                failures += 1;
            }
        }
        failures
    }
}

/// Name of the `sequence`th chunk file; the padding keeps name order equal to chunk order
pub fn chunk_name(prefix: &str, sequence: usize) -> String {
    format!("{prefix}{sequence:09}")
}

/// SHA-256 of a local file, computed off the async runtime
pub async fn local_digest(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || HashService::strong_digest(&owned))
        .await
        .map_err(|e| Error::other(format!("Hashing task failed: {}", e)))?
}
