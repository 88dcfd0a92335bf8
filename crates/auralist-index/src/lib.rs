//! Local indexing for Auralist
//!
//! [`Crawler`] walks the search directory, queues paths the catalog does not know yet and
//! flushes them in batches. Each flush hashes its files concurrently with [`HashService`]
//! and persists the resulting records once every hash in the batch has finished.
//!
//! # Examples
//!
//! ```rust,no_run
//! use auralist_catalog::MemoryCatalog;
//! use auralist_index::{Crawler, CrawlerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> auralist_types::Result<()> {
//! let catalog = Arc::new(MemoryCatalog::new());
//! let crawler = Crawler::new(catalog, CrawlerConfig::new("/music/", "studio"));
//! let stats = crawler.index().await?;
//! println!("{} new files", stats.files_indexed);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod crawler;
pub mod hash;

pub use crawler::{CrawlStats, Crawler, CrawlerConfig};
pub use hash::HashService;

/// Host name of the local machine
pub fn local_host_name() -> auralist_types::Result<String> {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .map_err(|e| auralist_types::Error::other(format!("Failed to read host name: {}", e)))
}
