//! In-memory remote used by this crate's unit tests

use async_trait::async_trait;
use auralist_index::HashService;
use auralist_remote::{
    decode_frame, CommandOutput, RemoteCommand, RemoteSession, RemoteSink, SinkFramer, SinkHeader,
};
use auralist_types::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct State {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: Vec<String>,
    pub commands: Vec<RemoteCommand>,
    pub sinks: Vec<(String, u64)>,
    pub fail: HashMap<&'static str, u32>,
    pub corrupt_sinks: bool,
    pub stall_sinks: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    pub state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }

    pub fn sinks(&self) -> usize {
        self.state.lock().unwrap().sinks.len()
    }

    pub fn fail_command(&self, name: &'static str, exit: u32) {
        self.state.lock().unwrap().fail.insert(name, exit);
    }

    pub fn corrupt_sinks(&self) {
        self.state.lock().unwrap().corrupt_sinks = true;
    }

    /// Sinks accept data but never finish
    pub fn stall_sinks(&self) {
        self.state.lock().unwrap().stall_sinks = true;
    }
}

#[async_trait]
impl RemoteSession for MemoryRemote {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());
        if let Some(&exit) = state.fail.get(command.name()) {
            return Ok(CommandOutput::with_status(exit));
        }

        let output = match command {
            RemoteCommand::FileExists { path } => {
                CommandOutput::with_status(u32::from(!state.files.contains_key(path)))
            }
            RemoteCommand::EnsureDir { path } => {
                state.dirs.push(path.clone());
                CommandOutput::ok("")
            }
            RemoteCommand::Touch { path } => {
                state.files.entry(path.clone()).or_default();
                CommandOutput::ok("")
            }
            RemoteCommand::Copy { from, to } => match state.files.get(from).cloned() {
                Some(data) => {
                    state.files.insert(to.clone(), data);
                    CommandOutput::ok("")
                }
                None => CommandOutput::with_status(1),
            },
            RemoteCommand::Concat { prefix, dest } => {
                let joined: Vec<u8> = state
                    .files
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix.as_str()))
                    .flat_map(|(_, data)| data.iter().copied())
                    .collect();
                state.files.insert(dest.clone(), joined);
                CommandOutput::ok("")
            }
            RemoteCommand::Remove { path } => {
                state.files.remove(path);
                CommandOutput::ok("")
            }
            RemoteCommand::Digest { path } => match state.files.get(path) {
                Some(data) => CommandOutput::ok(format!(
                    "{}  {}\n",
                    HashService::strong_digest_bytes(data),
                    path
                )),
                None => CommandOutput::with_status(1),
            },
            RemoteCommand::Hostname => CommandOutput::ok("mirror\n"),
        };
        Ok(output)
    }

    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.sinks.push((remote_path.to_string(), size));
            state.stall_sinks
        };
        let header = SinkHeader::for_path(remote_path, size);
        Ok(Box::new(MemorySink {
            remote: self.clone(),
            path: remote_path.to_string(),
            stream: header.encode(),
            framer: SinkFramer::new(header),
            stall,
        }))
    }
}

struct MemorySink {
    remote: MemoryRemote,
    path: String,
    stream: Vec<u8>,
    framer: SinkFramer,
    stall: bool,
}

#[async_trait]
impl RemoteSink for MemorySink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.framer.accept(data.len())?;
        self.stream.extend_from_slice(data);
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        let trailer = self.framer.trailer()?;
        self.stream.extend_from_slice(&trailer);
        let (_, content) = decode_frame(&self.stream)?;

        let mut state = self.remote.state.lock().unwrap();
        let mut content = content.to_vec();
        if state.corrupt_sinks {
            if let Some(first) = content.first_mut() {
                *first ^= 0xff;
            }
        }
        state.files.insert(self.path.clone(), content);
        Ok(())
    }
}
