//! In-memory collaborators for exercising the protocol without mutagen,
//! docker or rsync.

use super::{ContainerRuntime, ContainerState, SyncEngine, SyncState, Transfer};
use crate::error::EngineError;
use crate::remote::RemoteHost;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct FakeSyncEngine {
    sessions: Mutex<HashMap<String, SyncState>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeSyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, name: &str, state: SyncState) -> Self {
        lock(&self.sessions).insert(name.to_string(), state);
        self
    }

    /// Make `op` (`"create"`, `"flush"`, ...) fail from now on.
    pub fn fail(&self, op: &'static str) {
        lock(&self.failing).insert(op);
    }

    /// `"op name"` for every call, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, op: &'static str, name: &str) -> Result<(), EngineError> {
        lock(&self.calls).push(format!("{op} {name}"));
        if lock(&self.failing).contains(op) {
            return Err(EngineError::Sync(format!("{op} {name} failed")));
        }
        Ok(())
    }

    fn set(&self, name: &str, state: SyncState) {
        lock(&self.sessions).insert(name.to_string(), state);
    }
}

#[async_trait]
impl SyncEngine for FakeSyncEngine {
    async fn state(&self, name: &str) -> Result<SyncState, EngineError> {
        self.record("state", name)?;
        Ok(lock(&self.sessions)
            .get(name)
            .copied()
            .unwrap_or(SyncState::Absent))
    }

    async fn create(
        &self,
        name: &str,
        _local: &Path,
        _host: &RemoteHost,
        _remote_path: &str,
    ) -> Result<(), EngineError> {
        self.record("create", name)?;
        self.set(name, SyncState::Running);
        Ok(())
    }

    async fn pause(&self, name: &str) -> Result<(), EngineError> {
        self.record("pause", name)?;
        self.set(name, SyncState::Paused);
        Ok(())
    }

    async fn resume(&self, name: &str) -> Result<(), EngineError> {
        self.record("resume", name)?;
        self.set(name, SyncState::Running);
        Ok(())
    }

    async fn flush(&self, name: &str) -> Result<(), EngineError> {
        self.record("flush", name)
    }

    async fn terminate(&self, name: &str) -> Result<(), EngineError> {
        self.record("terminate", name)?;
        lock(&self.sessions).remove(name);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeContainerRuntime {
    containers: Mutex<HashMap<String, ContainerState>>,
    calls: Mutex<Vec<String>>,
    shell_exit: Mutex<i32>,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str, state: ContainerState) -> Self {
        lock(&self.containers).insert(name.to_string(), state);
        self
    }

    pub fn with_shell_exit(self, code: i32) -> Self {
        *lock(&self.shell_exit) = code;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn current(&self, name: &str) -> ContainerState {
        lock(&self.containers)
            .get(name)
            .copied()
            .unwrap_or(ContainerState::Absent)
    }

    fn record(&self, op: &str, name: &str) {
        lock(&self.calls).push(format!("{op} {name}"));
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn state(&self, name: &str) -> Result<ContainerState, EngineError> {
        self.record("state", name);
        Ok(self.current(name))
    }

    async fn start(&self, name: &str, _remote_path: &str) -> Result<(), EngineError> {
        self.record("start", name);
        lock(&self.containers).insert(name.to_string(), ContainerState::Running);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.record("stop", name);
        lock(&self.containers).insert(name.to_string(), ContainerState::Stopped);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.record("remove", name);
        lock(&self.containers).remove(name);
        Ok(())
    }

    async fn attach_shell(&self, name: &str) -> Result<i32, EngineError> {
        self.record("attach", name);
        if self.current(name) != ContainerState::Running {
            return Err(EngineError::Container(format!("{name} is not running")));
        }
        Ok(*lock(&self.shell_exit))
    }
}

/// Records uploads instead of copying anything.
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    uploads: Mutex<Vec<(PathBuf, String)>>,
    fail: Mutex<bool>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let t = Self::default();
        *lock(&t.fail) = true;
        t
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        lock(&self.uploads).clone()
    }
}

#[async_trait]
impl Transfer for RecordingTransfer {
    async fn upload(
        &self,
        local: &Path,
        _host: &RemoteHost,
        remote_path: &str,
    ) -> Result<(), EngineError> {
        if *lock(&self.fail) {
            return Err(EngineError::Sync(format!(
                "upload of {} failed",
                local.display()
            )));
        }
        lock(&self.uploads).push((local.to_path_buf(), remote_path.to_string()));
        Ok(())
    }
}
