//! Error types and handling for Auralist
//!
//! Every failure the indexer or the sync daemon can hit is one of these variants.
//! The classification helpers decide what the driving loops do with it: abort the
//! crawl, leave the record pending, reconnect, or stop the process.

use std::path::{Path, PathBuf};

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Low severity - the current record is retried on a later pass
    Low,
    /// Medium severity - the operation should be retried
    Medium,
    /// High severity - the current run (crawl) must be aborted
    High,
    /// Critical severity - the process should terminate
    Critical,
}

/// Main error type for Auralist operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Stat, open or read failure on the local source tree
    #[error("Local I/O error on '{path}': {message}")]
    LocalIo {
        /// Path that failed
        path: PathBuf,
        /// Error message from the I/O operation
        message: String,
    },

    /// The remote transport could not be established or was lost
    #[error("Connection error: {message}")]
    Connection {
        /// Error message describing the transport failure
        message: String,
    },

    /// A remote primitive exited unsuccessfully
    #[error("Remote command `{command}` failed (exit status {exit_status:?}): {message}")]
    RemoteCommand {
        /// Rendered shell command
        command: String,
        /// Exit status reported by the remote shell, if any
        exit_status: Option<u32>,
        /// Captured output or failure description
        message: String,
    },

    /// Post-transfer digest comparison failed
    #[error("Verification mismatch for '{path}': local {local}, remote {remote}")]
    VerificationMismatch {
        /// Remote path that was verified
        path: String,
        /// Digest computed locally
        local: String,
        /// Digest reported by the remote host
        remote: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Catalog store failure
    #[error("Catalog error: {message}")]
    Catalog {
        /// Error message describing the catalog issue
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// I/O failure without a source-tree path attached
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local source-tree errors
    LocalIo,
    /// Transport errors
    Connection,
    /// Remote primitive errors
    RemoteCommand,
    /// Digest mismatch after a transfer
    Verification,
    /// Configuration errors
    Config,
    /// Catalog errors
    Catalog,
    /// Timeout
    Timeout,
    /// Other I/O errors
    Io,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LocalIo { .. } => ErrorKind::LocalIo,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::RemoteCommand { .. } => ErrorKind::RemoteCommand,
            Self::VerificationMismatch { .. } => ErrorKind::Verification,
            Self::Config { .. } => ErrorKind::Config,
            Self::Catalog { .. } => ErrorKind::Catalog,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io { .. } => ErrorKind::Io,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RemoteCommand { .. } | Self::VerificationMismatch { .. } => ErrorSeverity::Low,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io { .. } => {
                ErrorSeverity::Medium
            }
            Self::Other { .. } | Self::Catalog { .. } => ErrorSeverity::Medium,
            Self::LocalIo { .. } => ErrorSeverity::High,
            Self::Config { .. } => ErrorSeverity::Critical,
        }
    }

    /// Check if this error is recoverable without operator intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { .. }
            | Self::RemoteCommand { .. }
            | Self::VerificationMismatch { .. }
            | Self::Timeout { .. }
            | Self::Catalog { .. }
            | Self::Io { .. }
            | Self::Other { .. } => true,
            Self::LocalIo { .. } | Self::Config { .. } => false,
        }
    }

    /// Check if this error means the remote connection should be dropped and re-established
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Create a new local I/O error for a path
    pub fn local_io<P: AsRef<Path>>(path: P, error: &std::io::Error) -> Self {
        Self::LocalIo {
            path: path.as_ref().to_path_buf(),
            message: error.to_string(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new remote command error
    pub fn remote_command<C: Into<String>, S: Into<String>>(
        command: C,
        exit_status: Option<u32>,
        message: S,
    ) -> Self {
        Self::RemoteCommand {
            command: command.into(),
            exit_status,
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new catalog error
    pub fn catalog<S: Into<String>>(message: S) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
