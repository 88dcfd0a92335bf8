//! Configuration management for Auralist
//!
//! Configuration is layered: built-in defaults, then an optional YAML, TOML or JSON file,
//! then environment variables prefixed with `AURALIST` (nested keys separated by `__`,
//! e.g. `AURALIST__REMOTE__HOST`). The result is validated before any work begins.
//!
//! # Examples
//!
//! ```rust,no_run
//! use auralist_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("auralist.yaml")
//!     .add_env_prefix("AURALIST")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Indexing {}", config.index.search_directory);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use auralist_types::{BatchLimits, ChunkSize, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AURALIST";

/// Main configuration structure for Auralist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local crawl configuration
    pub index: IndexConfig,
    /// Remote host configuration
    pub remote: RemoteConfig,
    /// Sync daemon configuration
    pub sync: SyncConfig,
    /// Catalog storage configuration
    pub catalog: CatalogConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the fields the sync daemon needs on top of the base validation
    pub fn validate_for_sync(&self) -> ConfigResult<()> {
        if self.remote.host.trim().is_empty() {
            return Err(ConfigError::missing_setting("remote.host"));
        }
        if self.remote.user.trim().is_empty() {
            return Err(ConfigError::missing_setting("remote.user"));
        }
        if self.remote.destination_root.trim().is_empty() {
            return Err(ConfigError::missing_setting("remote.destination_root"));
        }
        Ok(())
    }
}

/// Local crawl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root of the local media tree; always ends with `/` after loading
    pub search_directory: String,
    /// Lowercased extensions to index without the dot; empty admits everything
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Flush the path batch after this many files
    pub queue_length: usize,
    /// Flush the path batch after this many bytes
    pub size_limit: u64,
    /// Override the local host name recorded in the catalog
    #[serde(default)]
    pub host_name: Option<String>,
}

impl IndexConfig {
    /// Batch thresholds as a validated value
    pub fn batch_limits(&self) -> ConfigResult<BatchLimits> {
        BatchLimits::new(self.queue_length, self.size_limit)
            .map_err(|message| ConfigError::invalid_value("index.queue_length", &message))
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            search_directory: String::new(),
            extensions: Vec::new(),
            queue_length: BatchLimits::default_queue_length(),
            size_limit: BatchLimits::DEFAULT_SIZE_LIMIT,
            host_name: None,
        }
    }
}

/// Remote host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host name or address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Private key file
    pub private_key: PathBuf,
    /// Pinned SHA-256 host key fingerprint; unset disables verification with a warning
    #[serde(default)]
    pub host_fingerprint: Option<String>,
    /// Destination root on the remote host
    pub destination_root: String,
    /// Previous destination root used for server-side clones
    #[serde(default)]
    pub old_root: Option<String>,
    /// Timeout for establishing the connection
    pub connect_timeout_secs: u64,
    /// Timeout for one remote command or one chunk write
    pub command_timeout_secs: u64,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay_secs: u64,
}

impl RemoteConfig {
    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Reconnect policy derived from the configured delay
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::forever(Duration::from_secs(self.reconnect_delay_secs))
    }

    /// Old root with blank values treated as unset
    pub fn old_root(&self) -> Option<&str> {
        self.old_root
            .as_deref()
            .map(str::trim)
            .filter(|root| !root.is_empty())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            private_key: dirs::home_dir()
                .map(|home| home.join(".ssh").join("id_ed25519"))
                .unwrap_or_else(|| PathBuf::from("id_ed25519")),
            host_fingerprint: None,
            destination_root: String::new(),
            old_root: None,
            connect_timeout_secs: 30,
            command_timeout_secs: 600,
            reconnect_delay_secs: 10,
        }
    }
}

/// Sync daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Chunk size and chunking threshold in bytes
    pub chunk_size: u64,
    /// Timeout for one whole-file upload
    pub upload_timeout_secs: u64,
    /// Sleep between polls when nothing is pending
    pub poll_interval_secs: u64,
    /// Records fetched per poll
    pub list_limit: usize,
    /// Remote directory for chunk files
    pub temp_directory: String,
}

impl SyncConfig {
    /// Chunk size as a validated value
    pub fn chunk_size(&self) -> ConfigResult<ChunkSize> {
        ChunkSize::new(self.chunk_size)
            .map_err(|message| ConfigError::invalid_value("sync.chunk_size", &message))
    }

    /// Whole-file upload timeout
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Idle poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::DEFAULT,
            upload_timeout_secs: 600,
            poll_interval_secs: 30,
            list_limit: 100,
            temp_directory: "/tmp".to_string(),
        }
    }
}

/// Catalog storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path of the JSON catalog file
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("auralist").join("catalog.json"))
            .unwrap_or_else(|| PathBuf::from("auralist-catalog.json"));
        Self { path }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
