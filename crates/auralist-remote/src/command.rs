//! Remote shell primitives
//!
//! Every primitive renders to exactly one POSIX shell command with each path argument
//! single-quoted, so file names containing spaces, quotes or shell metacharacters are
//! passed through literally.

use crate::session::{CommandOutput, RemoteSession};
use async_trait::async_trait;
use auralist_types::{Error, Result};
use std::fmt;
use tracing::debug;

/// One remote primitive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    /// `test -f`: exit 0 when a regular file exists
    FileExists {
        /// Path to test
        path: String,
    },
    /// `mkdir -p`: idempotent recursive directory creation
    EnsureDir {
        /// Directory to create
        path: String,
    },
    /// `touch`: create an empty file
    Touch {
        /// File to create
        path: String,
    },
    /// `cp`: server-side copy
    Copy {
        /// Source path
        from: String,
        /// Destination path
        to: String,
    },
    /// `cat prefix* > dest`: ordered concatenation of chunk files
    Concat {
        /// Shared chunk-name prefix
        prefix: String,
        /// Destination path
        dest: String,
    },
    /// `rm -f`: remove one file
    Remove {
        /// File to remove
        path: String,
    },
    /// `sha256sum`: content digest of one file
    Digest {
        /// File to hash
        path: String,
    },
    /// `hostname`: name of the remote machine
    Hostname,
}

impl RemoteCommand {
    /// Render the shell command line
    pub fn render(&self) -> String {
        match self {
            Self::FileExists { path } => format!("test -f {}", quote(path)),
            Self::EnsureDir { path } => format!("mkdir -p {}", quote(path)),
            Self::Touch { path } => format!("touch {}", quote(path)),
            Self::Copy { from, to } => format!("cp {} {}", quote(from), quote(to)),
            Self::Concat { prefix, dest } => format!("cat {}* > {}", quote(prefix), quote(dest)),
            Self::Remove { path } => format!("rm -f {}", quote(path)),
            Self::Digest { path } => format!("sha256sum {}", quote(path)),
            Self::Hostname => "hostname".to_string(),
        }
    }

    /// Short name of the primitive for logs and counters
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileExists { .. } => "test",
            Self::EnsureDir { .. } => "mkdir",
            Self::Touch { .. } => "touch",
            Self::Copy { .. } => "cp",
            Self::Concat { .. } => "cat",
            Self::Remove { .. } => "rm",
            Self::Digest { .. } => "sha256sum",
            Self::Hostname => "hostname",
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote one shell word with single quotes
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Typed helpers over [`RemoteSession::run`]; a non-zero exit becomes a remote command error
#[async_trait]
pub trait RemoteOps: RemoteSession {
    /// Check whether a regular file exists at `path`
    async fn file_exists(&self, path: &str) -> Result<bool> {
        let command = RemoteCommand::FileExists {
            path: path.to_string(),
        };
        let output = self.run(&command).await?;
        match output.exit_status {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failure(&command, &output)),
        }
    }

    /// Create `path` and its parents if absent
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        self.run_checked(RemoteCommand::EnsureDir {
            path: path.to_string(),
        })
        .await
        .map(drop)
    }

    /// Create an empty file at `path`
    async fn touch(&self, path: &str) -> Result<()> {
        self.run_checked(RemoteCommand::Touch {
            path: path.to_string(),
        })
        .await
        .map(drop)
    }

    /// Copy `from` to `to` on the remote host
    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.run_checked(RemoteCommand::Copy {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await
        .map(drop)
    }

    /// Concatenate every file starting with `prefix`, in name order, into `dest`
    async fn concat(&self, prefix: &str, dest: &str) -> Result<()> {
        self.run_checked(RemoteCommand::Concat {
            prefix: prefix.to_string(),
            dest: dest.to_string(),
        })
        .await
        .map(drop)
    }

    /// Remove one file
    async fn remove(&self, path: &str) -> Result<()> {
        self.run_checked(RemoteCommand::Remove {
            path: path.to_string(),
        })
        .await
        .map(drop)
    }

    /// Lowercase hex SHA-256 of a remote file
    async fn digest(&self, path: &str) -> Result<String> {
        let command = RemoteCommand::Digest {
            path: path.to_string(),
        };
        let output = self.run_checked(command.clone()).await?;
        parse_digest(&output.stdout_lossy()).ok_or_else(|| {
            Error::remote_command(command.render(), output.exit_status, "unparseable digest output")
        })
    }

    /// Host name of the remote machine
    async fn hostname(&self) -> Result<String> {
        let command = RemoteCommand::Hostname;
        let output = self.run_checked(command.clone()).await?;
        let name = output.stdout_lossy().trim().to_string();
        if name.is_empty() {
            return Err(Error::remote_command(
                command.render(),
                output.exit_status,
                "empty host name",
            ));
        }
        Ok(name)
    }

    /// Run a command and fail on anything but exit status zero
    async fn run_checked(&self, command: RemoteCommand) -> Result<CommandOutput> {
        let output = self.run(&command).await?;
        if output.success() {
            debug!(command = %command, "Remote command succeeded");
            Ok(output)
        } else {
            Err(failure(&command, &output))
        }
    }
}

impl<T: RemoteSession + ?Sized> RemoteOps for T {}

fn failure(command: &RemoteCommand, output: &CommandOutput) -> Error {
    let stderr = output.stderr_lossy();
    let message = if stderr.trim().is_empty() {
        "command failed".to_string()
    } else {
        stderr.trim().to_string()
    };
    Error::remote_command(command.render(), output.exit_status, message)
}

/// Extract the digest from `sha256sum` output
pub fn parse_digest(stdout: &str) -> Option<String> {
    let token = stdout.split_whitespace().next()?;
    let token = token.trim_start_matches('\\');
    (token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}
