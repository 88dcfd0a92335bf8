//! Remote session interfaces

use crate::command::RemoteCommand;
use async_trait::async_trait;
use auralist_types::Result;
use std::sync::Arc;

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, `None` if the remote side never reported one
    pub exit_status: Option<u32>,
    /// Standard output
    pub stdout: Vec<u8>,
    /// Standard error
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Output of a command that exited with `status`
    pub fn with_status(status: u32) -> Self {
        Self {
            exit_status: Some(status),
            ..Self::default()
        }
    }

    /// Successful output carrying `stdout`
    pub fn ok<S: Into<Vec<u8>>>(stdout: S) -> Self {
        Self {
            exit_status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Check for exit status zero
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Standard output as text
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as text
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Writable byte stream into one named remote file
#[async_trait]
pub trait RemoteSink: Send {
    /// Append content bytes
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Close the stream; succeeds only once the remote side has stored every declared byte
    async fn finish(self: Box<Self>) -> Result<()>;
}

/// One remote connection able to run commands and receive files
///
/// `run` fails only when the transport fails; a command that ran and exited non-zero is
/// reported through [`CommandOutput::exit_status`].
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run one shell command
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Open a sink writing exactly `size` bytes to `remote_path`
    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>>;

    /// Check whether the underlying transport is still usable
    fn is_alive(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: RemoteSession + ?Sized> RemoteSession for Arc<T> {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        (**self).run(command).await
    }

    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>> {
        (**self).open_sink(remote_path, size).await
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

/// Factory for fresh sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced by this connector
    type Session: RemoteSession + 'static;

    /// Establish one new session
    async fn connect(&self) -> Result<Self::Session>;
}
