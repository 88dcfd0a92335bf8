//! Core type system and error handling for Auralist
//!
//! This crate provides the foundational types shared by the indexer, the catalog and the
//! sync daemon:
//!
//! - **Error handling**: one error enum with kinds, severity levels and recovery hints
//! - **Data model**: [`FileRecord`], [`SyncState`] and the crawler's [`PathBatch`]
//! - **Configuration values**: validated chunk sizes, batch limits and reconnect policy
//!
//! # Examples
//!
//! ```rust
//! use auralist_types::{ChunkSize, PathBatch, PathEntry, Result};
//!
//! fn example() -> Result<bool> {
//!     let mut batch = PathBatch::new();
//!     batch.push(PathEntry {
//!         path: "/music/a.flac".into(),
//!         relative_path: "a.flac".to_string(),
//!         size: 1024,
//!     });
//!     let chunk = ChunkSize::default();
//!     Ok(batch.should_flush(1, chunk.get()))
//! }
//! assert!(example().unwrap());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use config::{BatchLimits, ChunkSize, ReconnectPolicy};
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use types::*;
