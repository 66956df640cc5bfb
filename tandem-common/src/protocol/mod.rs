//! Lifecycle commands composed from the lock, ownership and session records.
//!
//! The sync engine, container runtime, file transfer and prompts are
//! traits; the CLI supplies process-backed implementations and the tests
//! supply [`fakes`].

mod coordinator;
pub mod fakes;
mod prompt;

pub use coordinator::{
    ContainerAction, Coordinator, LockDisposition, PushReport, RemoveReport, ShellReport,
    StartReport, StatusReport, StopReport, SyncAction,
};
pub use prompt::{NonInteractive, Prompter, ScriptedPrompter};

use crate::error::EngineError;
use crate::remote::RemoteHost;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

/// State of a named two-way sync session on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Absent,
    Running,
    Paused,
}

/// Background file-sync engine.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    async fn state(&self, name: &str) -> Result<SyncState, EngineError>;
    async fn create(
        &self,
        name: &str,
        local: &Path,
        host: &RemoteHost,
        remote_path: &str,
    ) -> Result<(), EngineError>;
    async fn pause(&self, name: &str) -> Result<(), EngineError>;
    async fn resume(&self, name: &str) -> Result<(), EngineError>;
    /// Block until pending changes have been propagated.
    async fn flush(&self, name: &str) -> Result<(), EngineError>;
    async fn terminate(&self, name: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// Container runtime on the remote host.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn state(&self, name: &str) -> Result<ContainerState, EngineError>;
    /// Start (creating if needed) a container with `remote_path` mounted.
    async fn start(&self, name: &str, remote_path: &str) -> Result<(), EngineError>;
    async fn stop(&self, name: &str) -> Result<(), EngineError>;
    async fn remove(&self, name: &str) -> Result<(), EngineError>;
    /// Run an interactive shell; returns its exit status.
    async fn attach_shell(&self, name: &str) -> Result<i32, EngineError>;
}

/// One-shot upload of a local tree to the remote host.
///
/// Implementations must leave `<remote_path>/.state/` alone so the
/// ownership record survives repeated pushes.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn upload(
        &self,
        local: &Path,
        host: &RemoteHost,
        remote_path: &str,
    ) -> Result<(), EngineError>;
}
