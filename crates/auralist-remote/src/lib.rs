//! Remote shell transport for Auralist
//!
//! This crate provides everything the sync engine needs from the destination host:
//!
//! - **Typed primitives**: [`RemoteCommand`] renders existence tests, directory creation,
//!   copies, concatenation, removal and checksums as single shell-quoted commands
//! - **Sink protocol**: length-framed, NUL-terminated streams into named remote files
//! - **SSH sessions**: private-key authentication with a pinned or explicitly disabled
//!   host key check
//! - **Reconnect**: [`ReconnectingSession`] retries connection on a fixed delay forever
//!
//! # Examples
//!
//! ```rust,no_run
//! use auralist_remote::{HostKeyPolicy, ReconnectingSession, RemoteOps, SshConfig, SshConnector};
//! use auralist_types::ReconnectPolicy;
//! use std::time::Duration;
//!
//! # async fn example() -> auralist_types::Result<()> {
//! let config = SshConfig {
//!     host: "mirror.local".to_string(),
//!     port: 22,
//!     user: "media".to_string(),
//!     private_key: "/home/media/.ssh/id_ed25519".into(),
//!     host_key: HostKeyPolicy::Disabled,
//!     connect_timeout: Duration::from_secs(30),
//!     command_timeout: Duration::from_secs(600),
//! };
//! let session = ReconnectingSession::new(SshConnector::new(config), ReconnectPolicy::default());
//! session.ensure_dir("/srv/media/new album").await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod host_key;
pub mod reconnect;
pub mod session;
pub mod sink;
pub mod ssh;

pub use command::{quote, RemoteCommand, RemoteOps};
pub use host_key::HostKeyPolicy;
pub use reconnect::ReconnectingSession;
pub use session::{CommandOutput, Connector, RemoteSession, RemoteSink};
pub use sink::{decode_frame, SinkFramer, SinkHeader};
pub use ssh::{SshConfig, SshConnector, SshSession};
