//! Identity digests for indexed files

use auralist_types::{Error, FileRecord, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

const READ_BUFFER: usize = 256 * 1024;

/// Stateless digest computations over local files
///
/// All file-reading methods block and are meant to run on a blocking thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashService;

impl HashService {
    /// IEEE CRC-32 of the file content, widened to `u64`
    pub fn crc32(path: &Path) -> Result<u64> {
        let mut hasher = crc32fast::Hasher::new();
        Self::stream(path, |chunk| hasher.update(chunk))?;
        Ok(u64::from(hasher.finalize()))
    }

    /// Lowercase hex SHA-256 of the file content
    pub fn strong_digest(path: &Path) -> Result<String> {
        let mut hasher = Sha256::new();
        Self::stream(path, |chunk| hasher.update(chunk))?;
        Ok(hex(&hasher.finalize()))
    }

    /// Lowercase hex SHA-256 of an in-memory buffer
    pub fn strong_digest_bytes(data: &[u8]) -> String {
        hex(&Sha256::digest(data))
    }

    /// XXH3-64 of the relative path; a pre-filter, never proof of identity
    pub fn path_hash(relative: &str) -> u64 {
        xxh3_64(relative.as_bytes())
    }

    /// Build a fresh catalog record for `path` found under `root`
    pub fn describe(root: &Path, path: &Path, size: u64, host: &str) -> Result<FileRecord> {
        let relative_path = relative_path(root, path)?;
        let crc32 = Self::crc32(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let now = Utc::now();

        Ok(FileRecord {
            id: uuid::Uuid::new_v4(),
            path_hash: Self::path_hash(&relative_path),
            relative_path,
            base_directory: base_directory(root),
            file_name,
            size_bytes: size,
            extension: extension_of(path),
            crc32,
            strong_digest: None,
            host_name: host.to_string(),
            created_at: now,
            updated_at: now,
            verified_at: None,
        })
    }

    fn stream(path: &Path, mut update: impl FnMut(&[u8])) -> Result<()> {
        let mut file = File::open(path).map_err(|e| Error::local_io(path, &e))?;
        let mut buffer = vec![0u8; READ_BUFFER];
        loop {
            let read = file.read(&mut buffer).map_err(|e| Error::local_io(path, &e))?;
            if read == 0 {
                return Ok(());
            }
            update(&buffer[..read]);
        }
    }
}

/// Path of `path` relative to `root`, `/` separated
///
/// Names that are not valid UTF-8 are rejected rather than converted lossily.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| Error::LocalIo {
        path: path.to_path_buf(),
        message: format!("not under search directory '{}'", root.display()),
    })?;

    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| Error::LocalIo {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })
        })
        .collect::<Result<Vec<&str>>>()?;
    Ok(parts.join("/"))
}

/// Lowercased extension without the leading dot, empty when absent
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn base_directory(root: &Path) -> String {
    let root = root.to_string_lossy();
    if root.ends_with('/') {
        root.into_owned()
    } else {
        format!("{root}/")
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
