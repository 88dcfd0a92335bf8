//! Remote session backed by a local directory
//!
//! [`LocalRemote`] interprets every typed remote command against a temporary directory that
//! stands in for the remote filesystem root, so scenario tests can observe exactly which
//! primitives the engine issued and what ended up on "disk".

use async_trait::async_trait;
use auralist_index::HashService;
use auralist_remote::{
    decode_frame, CommandOutput, Connector, RemoteCommand, RemoteSession, RemoteSink, SinkFramer,
    SinkHeader,
};
use auralist_types::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LocalState {
    commands: Vec<RemoteCommand>,
    sinks: Vec<(String, u64)>,
    failing: HashMap<&'static str, u32>,
    offline: bool,
    corrupt_sinks: bool,
}

/// Fake remote host rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalRemote {
    root: PathBuf,
    host_name: String,
    state: Arc<Mutex<LocalState>>,
}

impl LocalRemote {
    /// Create a remote whose `/` is `root` and whose `hostname` prints `host_name`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, host_name: S) -> Self {
        Self {
            root: root.into(),
            host_name: host_name.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Local path backing a remote absolute path
    pub fn local(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    /// Place a file on the remote side
    pub fn put(&self, remote: &str, data: &[u8]) {
        let path = self.local(remote);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create {:?}: {}", parent, e));
        }
        fs::write(&path, data).unwrap_or_else(|e| panic!("write {:?}: {}", path, e));
    }

    /// Content of a remote file, if present
    pub fn read(&self, remote: &str) -> Option<Vec<u8>> {
        fs::read(self.local(remote)).ok()
    }

    /// Number of commands run with the given primitive name (`test`, `cp`, `cat`, ...)
    pub fn count(&self, name: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|command| command.name() == name)
            .count()
    }

    /// Number of sinks opened
    pub fn sink_count(&self) -> usize {
        self.state().sinks.len()
    }

    /// Remote paths of every sink opened, in order
    pub fn sink_paths(&self) -> Vec<String> {
        self.state().sinks.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Every command run so far
    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.state().commands.clone()
    }

    /// Make every command with `name` exit with `status`
    pub fn fail_command(&self, name: &'static str, status: u32) {
        self.state().failing.insert(name, status);
    }

    /// Simulate losing or regaining the network
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Check whether the remote currently refuses traffic
    pub fn is_offline(&self) -> bool {
        self.state().offline
    }

    /// Flip the first byte of everything written through a sink
    pub fn corrupt_sinks(&self) {
        self.state().corrupt_sinks = true;
    }

    fn execute(&self, command: &RemoteCommand) -> CommandOutput {
        match command {
            RemoteCommand::FileExists { path } => {
                CommandOutput::with_status(u32::from(!self.local(path).is_file()))
            }
            RemoteCommand::EnsureDir { path } => status(fs::create_dir_all(self.local(path))),
            RemoteCommand::Touch { path } => status(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.local(path))
                    .map(drop),
            ),
            RemoteCommand::Copy { from, to } => {
                status(fs::copy(self.local(from), self.local(to)).map(drop))
            }
            RemoteCommand::Concat { prefix, dest } => status(self.concat(prefix, dest)),
            RemoteCommand::Remove { path } => match fs::remove_file(self.local(path)) {
                Err(e) if e.kind() != ErrorKind::NotFound => failed(&e),
                _ => CommandOutput::ok(""),
            },
            RemoteCommand::Digest { path } => match HashService::strong_digest(&self.local(path)) {
                Ok(digest) => CommandOutput::ok(format!("{}  {}\n", digest, path)),
                Err(e) => {
                    let mut output = CommandOutput::with_status(1);
                    output.stderr = e.to_string().into_bytes();
                    output
                }
            },
            RemoteCommand::Hostname => CommandOutput::ok(format!("{}\n", self.host_name)),
        }
    }

    fn concat(&self, prefix: &str, dest: &str) -> std::io::Result<()> {
        let prefix_path = self.local(prefix);
        let directory = prefix_path.parent().unwrap_or(&self.root);
        let stem = prefix_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut parts: Vec<PathBuf> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(&stem))
            })
            .collect();
        if parts.is_empty() {
            return Err(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{}*: No such file or directory", prefix),
            ));
        }
        parts.sort();

        let mut joined = Vec::new();
        for part in parts {
            joined.extend(fs::read(part)?);
        }
        fs::write(self.local(dest), joined)
    }
}

fn status(result: std::io::Result<()>) -> CommandOutput {
    match result {
        Ok(()) => CommandOutput::ok(""),
        Err(e) => failed(&e),
    }
}

fn failed(error: &std::io::Error) -> CommandOutput {
    let mut output = CommandOutput::with_status(1);
    output.stderr = error.to_string().into_bytes();
    output
}

#[async_trait]
impl RemoteSession for LocalRemote {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        {
            let mut state = self.state();
            if state.offline {
                return Err(Error::connection("remote host unreachable"));
            }
            state.commands.push(command.clone());
            if let Some(&exit) = state.failing.get(command.name()) {
                return Ok(CommandOutput::with_status(exit));
            }
        }
        Ok(self.execute(command))
    }

    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>> {
        let mut state = self.state();
        if state.offline {
            return Err(Error::connection("remote host unreachable"));
        }
        state.sinks.push((remote_path.to_string(), size));

        let header = SinkHeader::for_path(remote_path, size);
        Ok(Box::new(LocalSink {
            target: self.local(remote_path),
            remote_path: remote_path.to_string(),
            stream: header.encode(),
            framer: SinkFramer::new(header),
            corrupt: state.corrupt_sinks,
        }))
    }

    fn is_alive(&self) -> bool {
        !self.is_offline()
    }
}

struct LocalSink {
    target: PathBuf,
    remote_path: String,
    stream: Vec<u8>,
    framer: SinkFramer,
    corrupt: bool,
}

#[async_trait]
impl RemoteSink for LocalSink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.framer.accept(data.len())?;
        self.stream.extend_from_slice(data);
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        let trailer = self.framer.trailer()?;
        self.stream.extend_from_slice(&trailer);

        let (header, content) = decode_frame(&self.stream)?;
        let mut content = content.to_vec();
        if self.corrupt {
            if let Some(first) = content.first_mut() {
                *first ^= 0xff;
            }
        }
        write_target(&self.target, &content).map_err(|e| {
            Error::remote_command(
                format!("scp -t '{}'", self.remote_path),
                Some(1),
                format!("{}: {}", header.name, e),
            )
        })
    }
}

fn write_target(target: &Path, content: &[u8]) -> std::io::Result<()> {
    match target.parent() {
        Some(parent) if !parent.is_dir() => Err(std::io::Error::new(
            ErrorKind::NotFound,
            "No such file or directory",
        )),
        _ => fs::write(target, content),
    }
}

/// Connector handing out a [`LocalRemote`], refusing while it is offline or has failures left
#[derive(Debug)]
pub struct LocalConnector {
    remote: LocalRemote,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl LocalConnector {
    /// Connector that fails the first `failures` attempts
    pub fn new(remote: LocalRemote, failures: u32) -> Self {
        Self {
            remote,
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    /// Connection attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for LocalConnector {
    type Session = LocalRemote;

    async fn connect(&self) -> Result<LocalRemote> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let scheduled_failure = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.remote.is_offline() {
            return Err(Error::connection("connection refused"));
        }
        Ok(self.remote.clone())
    }
}
