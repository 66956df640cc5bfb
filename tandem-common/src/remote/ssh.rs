//! SSH-backed executor using `openssh` control-master sessions.

use super::{ExecOutput, RemoteExecutor, RemoteHost};
use crate::error::RemoteError;
use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Runs commands over SSH, reusing one multiplexed session per destination.
pub struct SshExecutor {
    connect_timeout: Duration,
    known_hosts: KnownHosts,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            known_hosts: KnownHosts::Add,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn session(&self, host: &RemoteHost) -> Result<Arc<Session>, RemoteError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&host.destination) {
            return Ok(Arc::clone(session));
        }

        let mut builder = SessionBuilder::default();
        builder
            .known_hosts_check(self.known_hosts.clone())
            .connect_timeout(self.connect_timeout);
        if let Some(ref identity) = host.identity_file {
            builder.keyfile(identity);
        }

        debug!(host = %host, "opening ssh session");
        let session = builder
            .connect(&host.destination)
            .await
            .map_err(|e| RemoteError::Connection {
                host: host.destination.clone(),
                message: e.to_string(),
            })?;
        let session = Arc::new(session);
        sessions.insert(host.destination.clone(), Arc::clone(&session));
        Ok(session)
    }

    async fn forget(&self, host: &RemoteHost) {
        self.sessions.lock().await.remove(&host.destination);
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<ExecOutput, RemoteError> {
        let session = self.session(host).await?;
        let output = match session.raw_command(command).output().await {
            Ok(output) => output,
            Err(e) => {
                // A dead control master poisons every later command.
                warn!(host = %host, error = %e, "ssh session failed; dropping it");
                self.forget(host).await;
                return Err(RemoteError::Connection {
                    host: host.destination.clone(),
                    message: e.to_string(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(ExecOutput::ok(stdout))
        } else {
            Ok(ExecOutput {
                success: false,
                stdout,
                error: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            })
        }
    }
}
