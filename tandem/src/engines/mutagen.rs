//! Two-way background sync through the `mutagen` CLI.

use super::endpoint;
use super::process::run_tool;
use async_trait::async_trait;
use std::path::Path;
use tandem_common::protocol::{SyncEngine, SyncState};
use tandem_common::{EngineError, RemoteHost};
use tracing::debug;

const PAUSED_TEMPLATE: &str = "{{ range . }}{{ .Paused }}{{ end }}";

/// Drives `mutagen sync` sessions named after the project resource.
#[derive(Debug, Clone)]
pub struct MutagenSync {
    program: String,
}

impl Default for MutagenSync {
    fn default() -> Self {
        Self::new()
    }
}

impl MutagenSync {
    pub fn new() -> Self {
        Self {
            program: "mutagen".to_string(),
        }
    }

    async fn sync(&self, args: &[&str]) -> Result<String, EngineError> {
        let output = run_tool(&self.program, std::iter::once("sync").chain(args.iter().copied()), &[])
            .await
            .map_err(EngineError::Sync)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(EngineError::Sync(format!(
                "mutagen sync {}: {}",
                args.first().copied().unwrap_or_default(),
                output.message()
            )))
        }
    }
}

/// Map `sync list` template output to a state.
fn parse_paused(stdout: &str) -> SyncState {
    match stdout.trim() {
        "" => SyncState::Absent,
        s if s.starts_with("true") => SyncState::Paused,
        _ => SyncState::Running,
    }
}

fn is_missing_session(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("unable to locate") || lower.contains("no matching sessions")
}

#[async_trait]
impl SyncEngine for MutagenSync {
    async fn state(&self, name: &str) -> Result<SyncState, EngineError> {
        match self.sync(&["list", "--template", PAUSED_TEMPLATE, name]).await {
            Ok(stdout) => Ok(parse_paused(&stdout)),
            Err(EngineError::Sync(message)) if is_missing_session(&message) => {
                Ok(SyncState::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        name: &str,
        local: &Path,
        host: &RemoteHost,
        remote_path: &str,
    ) -> Result<(), EngineError> {
        let alpha = local.to_string_lossy();
        let beta = endpoint(host, remote_path);
        debug!(session = name, %alpha, %beta, "creating sync session");
        self.sync(&[
            "create",
            "--name",
            name,
            "--sync-mode",
            "two-way-resolved",
            "--ignore-vcs",
            alpha.as_ref(),
            beta.as_str(),
        ])
        .await?;
        Ok(())
    }

    async fn pause(&self, name: &str) -> Result<(), EngineError> {
        self.sync(&["pause", name]).await.map(drop)
    }

    async fn resume(&self, name: &str) -> Result<(), EngineError> {
        self.sync(&["resume", name]).await.map(drop)
    }

    async fn flush(&self, name: &str) -> Result<(), EngineError> {
        self.sync(&["flush", name]).await.map(drop)
    }

    async fn terminate(&self, name: &str) -> Result<(), EngineError> {
        self.sync(&["terminate", name]).await.map(drop)
    }
}
