//! Session wrapper that reconnects on a fixed delay
//!
//! The wrapper connects lazily on first use. A failed connection attempt is retried after
//! the policy's delay until it succeeds, so callers see a pause rather than an error. Any
//! transport failure during a call drops the current session, the call itself still fails,
//! and the next call reconnects.

use crate::command::RemoteCommand;
use crate::session::{CommandOutput, Connector, RemoteSession, RemoteSink};
use async_trait::async_trait;
use auralist_types::{ReconnectPolicy, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// [`RemoteSession`] that owns one connection and re-establishes it when lost
pub struct ReconnectingSession<C: Connector> {
    connector: C,
    policy: ReconnectPolicy,
    current: Mutex<Option<Arc<C::Session>>>,
    generation: AtomicU64,
    failed_attempts: AtomicU64,
}

impl<C: Connector> ReconnectingSession<C> {
    /// Wrap a connector
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
        }
    }

    /// Number of sessions established so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of failed connection attempts so far
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::SeqCst)
    }

    /// Current session, connecting first if there is none or it has died
    pub async fn session(&self) -> Result<Arc<C::Session>> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref().filter(|s| s.is_alive()) {
            return Ok(session.clone());
        }
        *current = None;

        let mut failures: u32 = 0;
        loop {
            match self.connector.connect().await {
                Ok(session) => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures > 0 {
                        info!("Reconnected after {} failed attempts", failures);
                    }
                    info!(generation, "Remote session ready");
                    let session = Arc::new(session);
                    *current = Some(session.clone());
                    return Ok(session);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                    if !self.policy.allows(failures) {
                        return Err(e);
                    }
                    warn!(
                        attempt = failures,
                        "Connection failed: {}; retrying in {:?}", e, self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }

    /// Drop the current session so the next call reconnects
    pub async fn reset(&self) {
        if self.current.lock().await.take().is_some() {
            warn!("Dropping remote session after transport failure");
        }
    }

    async fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() {
                self.reset().await;
            }
        }
        result
    }
}

#[async_trait]
impl<C: Connector> RemoteSession for ReconnectingSession<C> {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let session = self.session().await?;
        let result = session.run(command).await;
        self.observe(result).await
    }

    async fn open_sink(&self, remote_path: &str, size: u64) -> Result<Box<dyn RemoteSink>> {
        let session = self.session().await?;
        let result = session.open_sink(remote_path, size).await;
        self.observe(result).await
    }
}
