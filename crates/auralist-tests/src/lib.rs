//! Auralist scenario testing support
//!
//! This crate wires the real crawler, catalog and sync engine to [`LocalRemote`], a fake
//! remote host backed by a temporary directory. The scenario tests under `tests/` drive
//! whole index-and-sync flows through it and assert on the remote primitives issued.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Fake remote host and connector
pub mod local_remote;

/// Fixtures shared across the scenario tests
pub mod test_utils;

pub use local_remote::{LocalConnector, LocalRemote};
pub use test_utils::{destination, generate_test_data, settings, TestDataPattern, TestWorld};
