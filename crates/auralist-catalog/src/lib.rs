//! Catalog storage for Auralist
//!
//! [`CatalogStore`] is the interface the crawler and the sync engine consume. Two adapters
//! are provided: [`MemoryCatalog`] for tests and dry runs, and [`JsonCatalog`] which keeps
//! the record set in a JSON snapshot with an append-only journal of later changes.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod json;
pub mod memory;
pub mod store;

pub use json::JsonCatalog;
pub use memory::MemoryCatalog;
pub use store::{CatalogStore, RecordSet};
