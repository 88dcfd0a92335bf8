//! SSH transport built on russh
//!
//! Commands run on a fresh exec channel each; sinks run `scp -t` on their own channel and
//! stream the framed file through its stdin.

use crate::command::{quote, RemoteCommand};
use crate::host_key::HostKeyPolicy;
use crate::session::{CommandOutput, Connector, RemoteSession, RemoteSink};
use crate::sink::{SinkFramer, SinkHeader};
use async_trait::async_trait;
use auralist_config::RemoteConfig;
use auralist_types::{Error, Result};
use russh::client;
use russh::{Channel, ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// SSH connection settings
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Host name or address
    pub host: String,
    /// Port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Private key file
    pub private_key: PathBuf,
    /// Host key verification policy
    pub host_key: HostKeyPolicy,
    /// Timeout for connecting and authenticating
    pub connect_timeout: Duration,
    /// Timeout for one command or one sink
    pub command_timeout: Duration,
}

impl SshConfig {
    /// Settings from the `[remote]` configuration section
    pub fn from_remote(remote: &RemoteConfig) -> Self {
        Self {
            host: remote.host.clone(),
            port: remote.port,
            user: remote.user.clone(),
            private_key: remote.private_key.clone(),
            host_key: HostKeyPolicy::from_fingerprint(remote.host_fingerprint.as_deref()),
            connect_timeout: remote.connect_timeout(),
            command_timeout: remote.command_timeout(),
        }
    }
}

struct SshHandler {
    host: String,
    policy: HostKeyPolicy,
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self
            .policy
            .verify(&self.host, &server_public_key.fingerprint()))
    }
}

/// One authenticated SSH connection
pub struct SshSession {
    handle: client::Handle<SshHandler>,
    command_timeout: Duration,
}

impl SshSession {
    /// Connect and authenticate with the configured private key
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        info!(addr = %addr, user = %config.user, "Connecting via SSH");

        let key_data = tokio::fs::read(&config.private_key).await.map_err(|e| {
            Error::config(format!(
                "Failed to read private key '{}': {}",
                config.private_key.display(),
                e
            ))
        })?;
        let key_pair = russh_keys::decode_secret_key(&String::from_utf8_lossy(&key_data), None)
            .map_err(|e| Error::config(format!("Failed to decode private key: {}", e)))?;

        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        });
        let handler = SshHandler {
            host: config.host.clone(),
            policy: config.host_key.clone(),
        };

        let seconds = config.connect_timeout.as_secs();
        let mut handle = tokio::time::timeout(config.connect_timeout, async {
            client::connect(ssh_config, addr.as_str(), handler).await
        })
        .await
        .map_err(|_| Error::Timeout { seconds })?
        .map_err(|e| Error::connection(format!("SSH connection to {} failed: {}", addr, e)))?;

        let authenticated = handle
            .authenticate_publickey(config.user.as_str(), Arc::new(key_pair))
            .await
            .map_err(|e| Error::connection(format!("Public key authentication failed: {}", e)))?;
        if !authenticated {
            return Err(Error::connection(format!(
                "Public key authentication rejected for user '{}'",
                config.user
            )));
        }

        info!(addr = %addr, "SSH session established");
        Ok(Self {
            handle,
            command_timeout: config.command_timeout,
        })
    }

    /// Close the connection
    pub async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;
    }

    async fn exec(&self, command: &str) -> Result<Channel<client::Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::connection(format!("Failed to open SSH channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::connection(format!("Failed to execute `{}`: {}", command, e)))?;
        Ok(channel)
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            seconds: self.command_timeout.as_secs(),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let rendered = command.render();
        debug!(command = %rendered, "Running remote command");

        tokio::time::timeout(self.command_timeout, async {
            let mut channel = self.exec(&rendered).await?;
            Ok::<_, Error>(collect(&mut channel).await)
        })
        .await
        .map_err(|_| self.timeout_error())?
    }

    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>> {
        let command = format!("scp -t {}", quote(remote_path));
        debug!(command = %command, size, "Opening remote sink");

        let header = SinkHeader::for_path(remote_path, size);
        let channel = tokio::time::timeout(self.command_timeout, async {
            let channel = self.exec(&command).await?;
            channel
                .data(&header.encode()[..])
                .await
                .map_err(|e| Error::connection(format!("Failed to send sink header: {}", e)))?;
            Ok::<_, Error>(channel)
        })
        .await
        .map_err(|_| self.timeout_error())??;

        Ok(Box::new(SshSink {
            channel,
            framer: SinkFramer::new(header),
            command,
            timeout: self.command_timeout,
        }))
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }
}

struct SshSink {
    channel: Channel<client::Msg>,
    framer: SinkFramer,
    command: String,
    timeout: Duration,
}

#[async_trait]
impl RemoteSink for SshSink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.framer.accept(data.len())?;
        tokio::time::timeout(self.timeout, self.channel.data(data))
            .await
            .map_err(|_| Error::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| Error::connection(format!("Sink write failed: {}", e)))
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        let trailer = self.framer.trailer()?;
        let seconds = self.timeout.as_secs();

        let output = tokio::time::timeout(self.timeout, async {
            self.channel
                .data(&trailer[..])
                .await
                .map_err(|e| Error::connection(format!("Sink write failed: {}", e)))?;
            self.channel
                .eof()
                .await
                .map_err(|e| Error::connection(format!("Sink close failed: {}", e)))?;
            Ok::<_, Error>(collect(&mut self.channel).await)
        })
        .await
        .map_err(|_| Error::Timeout { seconds })??;

        // scp acknowledges with NUL bytes; 1 or 2 introduces an error message.
        let refused = output.stdout.iter().any(|&b| b == 1 || b == 2);
        if output.success() && !refused {
            debug!(command = %self.command, bytes = self.framer.written(), "Sink complete");
            Ok(())
        } else {
            let mut message = output.stderr_lossy();
            if refused {
                message.push_str(&String::from_utf8_lossy(&output.stdout));
            }
            Err(Error::remote_command(
                self.command.clone(),
                output.exit_status,
                message.trim().to_string(),
            ))
        }
    }
}

async fn collect(channel: &mut Channel<client::Msg>) -> CommandOutput {
    let mut output = CommandOutput::default();
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => output.stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                output.stderr.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => output.exit_status = Some(exit_status),
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }
    output
}

/// Opens [`SshSession`]s from fixed settings
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self) -> Result<SshSession> {
        SshSession::connect(&self.config).await
    }
}
