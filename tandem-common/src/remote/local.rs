//! Executor that runs commands with the local `sh`.
//!
//! Used when the "remote" base path is a share mounted on this machine
//! (`host = "local"`), and by the test suite to exercise the real shell
//! fragments against a temp directory.

use super::{ExecOutput, RemoteExecutor, RemoteHost};
use crate::error::RemoteError;
use async_trait::async_trait;
use tokio::process::Command;

/// Host name that selects [`LocalExecutor`] in configuration.
pub const LOCAL_HOST: &str = "local";

#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    shell: Option<String>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific shell binary instead of `sh`.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<ExecOutput, RemoteError> {
        let shell = self.shell.as_deref().unwrap_or("sh");
        let output = Command::new(shell)
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| RemoteError::Connection {
                host: host.destination.clone(),
                message: format!("failed to spawn {shell}: {e}"),
            })?;

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
