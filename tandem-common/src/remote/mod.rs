//! Remote command execution primitive.
//!
//! Everything Tandem knows about the remote host it learns by running a
//! shell string there and reading stdout. The primitive is a trait so the
//! lock and state stores can run against SSH, a locally mounted share, or
//! a scripted mock.

mod fs;
mod local;
mod mock;
#[cfg(unix)]
mod ssh;

pub use fs::RemoteFs;
pub use local::{LOCAL_HOST, LocalExecutor};
pub use mock::MockExecutor;
#[cfg(unix)]
pub use ssh::SshExecutor;

use crate::error::RemoteError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Where remote commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    /// SSH destination (`host` or `user@host`).
    pub destination: String,
    /// SSH identity file (optional).
    pub identity_file: Option<PathBuf>,
}

impl RemoteHost {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            identity_file: None,
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination)
    }
}

/// Result of a command that reached the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
    /// Stderr (or a synthesized message) when `success` is false.
    pub error: Option<String>,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            error: Some(error.into()),
        }
    }

    /// Convert a non-zero exit into [`RemoteError::Command`].
    pub fn into_stdout(self, host: &RemoteHost) -> Result<String, RemoteError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(RemoteError::Command {
                host: host.destination.clone(),
                message: self
                    .error
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "exited with non-zero status".to_string()),
            })
        }
    }
}

/// Runs a shell string on a named host.
///
/// Implementations return `Err` only when the host could not be reached;
/// a command that ran and failed is `Ok` with `success == false`. No
/// retries and no timeout beyond what the transport applies.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<ExecOutput, RemoteError>;
}
