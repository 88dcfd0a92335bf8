//! Synchronization engine for Auralist
//!
//! This crate moves catalogued files to the remote destination:
//!
//! - **Skip detection**: files already identical at the destination are only marked verified
//! - **Zero-length files**: created remotely without any transfer
//! - **Old-root cloning**: content already present under a previous remote layout is copied
//!   server-side once both checksum and digest agree
//! - **Uploads**: whole-file streaming below the chunk threshold, [`ChunkedTransfer`] above it,
//!   and a digest comparison before anything is marked verified
//!
//! # Examples
//!
//! ```rust,no_run
//! use auralist_catalog::JsonCatalog;
//! use auralist_config::Config;
//! use auralist_remote::{ReconnectingSession, SshConfig, SshConnector};
//! use auralist_sync::{SyncEngine, SyncSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> auralist_types::Result<()> {
//! let config = Config::default();
//! let catalog = Arc::new(JsonCatalog::open(&config.catalog.path).await?);
//! let session = Arc::new(ReconnectingSession::new(
//!     SshConnector::new(SshConfig::from_remote(&config.remote)),
//!     config.remote.reconnect_policy(),
//! ));
//!
//! let engine = SyncEngine::new(catalog, session, SyncSettings::from_config(&config)?, "studio");
//! let stats = engine.run_once().await?;
//! println!("{} verified, {} pending after errors", stats.verified(), stats.failed);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod chunked;
pub mod engine;
pub mod stats;

#[cfg(test)]
mod testing;

pub use chunked::{chunk_name, ChunkReader, ChunkReport, ChunkedTransfer};
pub use engine::{SyncEngine, SyncOutcome, SyncSettings};
pub use stats::SyncStats;
