//! The lifecycle commands.
//!
//! Each command is a straight sequence of remote round trips. Conflicts
//! are surfaced to the operator through the [`Prompter`]; nothing retries
//! and nothing rolls back once a remote write has been issued.

use super::{ContainerRuntime, ContainerState, Prompter, SyncEngine, SyncState, Transfer};
use crate::config::ResolvedProject;
use crate::error::ProtocolError;
use crate::identity::Identity;
use crate::lock::{AcquireOutcome, LockRecord, LockStatus, RemoteLock};
use crate::readout::Readout;
use crate::remote::{RemoteExecutor, RemoteFs, RemoteHost};
use crate::state::{
    DEFAULT_SESSION_TTL, LocalStateStore, OwnershipRecord, OwnershipStore, SessionKey,
    SessionReadout, SessionRecord, SessionTracker, WriteAuthorization,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Resumed,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub project: String,
    pub lock: LockRecord,
    /// The lock was already ours and only its timestamp changed.
    pub refreshed: bool,
    /// Previous holder when the lock was taken over.
    pub took_over_from: Option<LockRecord>,
    pub sync: SyncAction,
    pub container: ContainerAction,
}

/// What `stop` did with the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockDisposition {
    Released,
    NotHeld,
    HeldElsewhere { holder: LockRecord },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub project: String,
    pub lock: LockDisposition,
    pub flushed: bool,
    pub sync_paused: bool,
    pub container_stopped: bool,
    pub session_cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub project: String,
    pub remote_path: String,
    /// Set when this push claimed an unowned project.
    pub ownership_claimed: Option<OwnershipRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub project: String,
    pub sync_terminated: bool,
    pub session_cleared: bool,
    pub remote_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellReport {
    pub project: String,
    pub session: SessionRecord,
    /// Another machine's live session that `--force` overrode.
    pub overrode: Option<SessionRecord>,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub project: String,
    pub lock: Readout<LockRecord>,
    pub lock_owned_by_me: bool,
    pub ownership: Readout<OwnershipRecord>,
    pub session: SessionReadout,
    /// `None` when the engine could not be queried.
    pub sync: Option<SyncState>,
    pub container: Option<ContainerState>,
}

/// Runs lifecycle commands for one machine against one remote host.
pub struct Coordinator {
    host: RemoteHost,
    identity: Identity,
    fs: RemoteFs,
    lock: RemoteLock,
    ownership: OwnershipStore,
    session_key: SessionKey,
    session_ttl: Duration,
    sync: Arc<dyn SyncEngine>,
    containers: Arc<dyn ContainerRuntime>,
    transfer: Arc<dyn Transfer>,
    prompter: Arc<dyn Prompter>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        host: RemoteHost,
        base_path: &str,
        identity: Identity,
        sync: Arc<dyn SyncEngine>,
        containers: Arc<dyn ContainerRuntime>,
        transfer: Arc<dyn Transfer>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            fs: RemoteFs::new(Arc::clone(&executor), host.clone()),
            lock: RemoteLock::new(
                Arc::clone(&executor),
                host.clone(),
                base_path,
                identity.clone(),
            ),
            ownership: OwnershipStore::new(executor, host.clone(), identity.clone()),
            host,
            identity,
            session_key: SessionKey::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            sync,
            containers,
            transfer,
            prompter,
        }
    }

    pub fn with_session(mut self, key: SessionKey, ttl: Duration) -> Self {
        self.session_key = key;
        self.session_ttl = ttl;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn lock(&self) -> &RemoteLock {
        &self.lock
    }

    pub fn ownership(&self) -> &OwnershipStore {
        &self.ownership
    }

    pub fn sessions(&self, project: &ResolvedProject) -> SessionTracker {
        SessionTracker::new(
            LocalStateStore::for_project(&project.local_path),
            self.identity.clone(),
            self.session_key.clone(),
        )
        .with_ttl(self.session_ttl)
    }

    /// Ask, turning "no" into [`ProtocolError::Aborted`].
    fn confirm(&self, message: &str) -> Result<(), ProtocolError> {
        if self.prompter.confirm(message)? {
            Ok(())
        } else {
            Err(ProtocolError::Aborted(message.to_string()))
        }
    }

    /// Acquire the lock, then bring up sync and the container.
    ///
    /// A lock held elsewhere is taken over only after confirmation, or
    /// directly when `takeover` is set.
    pub async fn start(
        &self,
        project: &ResolvedProject,
        takeover: bool,
    ) -> Result<StartReport, ProtocolError> {
        let name = project.name.as_str();
        let (record, refreshed, took_over_from) = match self.lock.acquire(name).await? {
            AcquireOutcome::Acquired { record, refreshed } => (record, refreshed, None),
            AcquireOutcome::Held { existing } => {
                if !takeover {
                    self.confirm(&format!(
                        "'{name}' is locked by {} since {}. Take over the lock?",
                        existing.holder(),
                        existing.timestamp.to_rfc3339()
                    ))?;
                }
                match self.lock.force_takeover(name).await? {
                    AcquireOutcome::Acquired { record, .. } => (record, false, Some(existing)),
                    AcquireOutcome::Held { existing } => {
                        return Err(ProtocolError::LockHeld {
                            project: name.to_string(),
                            holder: existing,
                        });
                    }
                }
            }
        };

        let sync = match self.sync.state(&project.resource_name).await? {
            SyncState::Absent => {
                self.sync
                    .create(
                        &project.resource_name,
                        &project.local_path,
                        &self.host,
                        &project.remote_path,
                    )
                    .await?;
                SyncAction::Created
            }
            SyncState::Paused => {
                self.sync.resume(&project.resource_name).await?;
                SyncAction::Resumed
            }
            SyncState::Running => SyncAction::AlreadyRunning,
        };

        let container = match self.containers.state(&project.resource_name).await? {
            ContainerState::Running => ContainerAction::AlreadyRunning,
            ContainerState::Absent | ContainerState::Stopped => {
                self.containers
                    .start(&project.resource_name, &project.remote_path)
                    .await?;
                ContainerAction::Started
            }
        };

        info!(
            project = name,
            machine = %self.identity.machine,
            refreshed,
            takeover = took_over_from.is_some(),
            ?sync,
            ?container,
            "project started"
        );
        Ok(StartReport {
            project: name.to_string(),
            lock: record,
            refreshed,
            took_over_from,
            sync,
            container,
        })
    }

    /// Clear our session, flush and pause sync, stop the container and
    /// release our lock.
    ///
    /// The session is cleared first so the flush carries its removal to the
    /// remote copy.
    ///
    /// A lock held by another machine is reported and left in place, and so
    /// is that machine's container.
    pub async fn stop(&self, project: &ResolvedProject) -> Result<StopReport, ProtocolError> {
        let name = project.name.as_str();
        let status = self.lock.status(name).await?;
        let held_elsewhere = match &status {
            LockStatus::Locked {
                owned_by_me: false,
                info,
            } => Some(info.clone()),
            _ => None,
        };

        let session_cleared = self.sessions(project).clear_session()?;

        let sync_state = self.sync.state(&project.resource_name).await?;
        let mut flushed = false;
        let mut sync_paused = false;
        if sync_state == SyncState::Running {
            match self.sync.flush(&project.resource_name).await {
                Ok(()) => flushed = true,
                Err(e) => warn!(project = name, error = %e, "sync flush failed; pausing anyway"),
            }
            self.sync.pause(&project.resource_name).await?;
            sync_paused = true;
        }

        let mut container_stopped = false;
        if held_elsewhere.is_none()
            && self.containers.state(&project.resource_name).await? == ContainerState::Running
        {
            self.containers.stop(&project.resource_name).await?;
            container_stopped = true;
        }

        let lock = match status {
            LockStatus::Locked {
                owned_by_me: true, ..
            } => {
                self.lock.release(name).await?;
                LockDisposition::Released
            }
            LockStatus::Locked { info, .. } => {
                warn!(
                    project = name,
                    holder = %info.holder(),
                    "lock is held by another machine; leaving it"
                );
                LockDisposition::HeldElsewhere { holder: info }
            }
            LockStatus::Unlocked => LockDisposition::NotHeld,
        };

        info!(project = name, machine = %self.identity.machine, ?lock, "project stopped");
        Ok(StopReport {
            project: name.to_string(),
            lock,
            flushed,
            sync_paused,
            container_stopped,
            session_cleared,
        })
    }

    /// Ownership check plus double confirmation before touching the
    /// remote copy. `force` skips the prompts, never the ownership check.
    pub async fn guarded_remote_mutation(
        &self,
        project: &ResolvedProject,
        action: &str,
        force: bool,
    ) -> Result<WriteAuthorization, ProtocolError> {
        self.guarded_mutation_with(project, action, None, force).await
    }

    /// As [`Self::guarded_remote_mutation`], appending `detail` to the first
    /// question.
    async fn guarded_mutation_with(
        &self,
        project: &ResolvedProject,
        action: &str,
        detail: Option<String>,
        force: bool,
    ) -> Result<WriteAuthorization, ProtocolError> {
        let auth = self
            .ownership
            .check_write_authorization(&project.remote_path)
            .await?;
        if let WriteAuthorization::Denied { owner } = auth {
            return Err(ProtocolError::OwnershipDenied {
                project: project.name.clone(),
                owner,
            });
        }

        if !force {
            self.confirm(&format!(
                "{action} '{}' at {}:{}?{}",
                project.name,
                self.host,
                project.remote_path,
                detail.map(|d| format!(" {d}")).unwrap_or_default()
            ))?;
            self.confirm("This changes the shared remote copy. Are you sure?")?;
        }
        Ok(auth)
    }

    /// Upload the local tree; the first push claims ownership.
    pub async fn push(
        &self,
        project: &ResolvedProject,
        force: bool,
    ) -> Result<PushReport, ProtocolError> {
        let auth = self.guarded_remote_mutation(project, "Push", force).await?;

        self.transfer
            .upload(&project.local_path, &self.host, &project.remote_path)
            .await?;

        let ownership_claimed = if auth.is_unclaimed() {
            Some(self.ownership.set_ownership(&project.remote_path).await?)
        } else {
            None
        };

        info!(
            project = %project.name,
            remote = %project.remote_path,
            claimed = ownership_claimed.is_some(),
            "project pushed"
        );
        Ok(PushReport {
            project: project.name.clone(),
            remote_path: project.remote_path.clone(),
            ownership_claimed,
        })
    }

    /// Tear down this machine's sync session and session record. With
    /// `remote`, also delete the container, the remote copy and its lock.
    ///
    /// Local source files are never touched.
    pub async fn remove(
        &self,
        project: &ResolvedProject,
        remote: bool,
        force: bool,
    ) -> Result<RemoveReport, ProtocolError> {
        let name = project.name.as_str();
        if remote {
            let detail = match self.lock.status(name).await? {
                LockStatus::Locked {
                    owned_by_me: false,
                    info,
                } => {
                    warn!(
                        project = name,
                        holder = %info.holder(),
                        "removing a project locked by another machine"
                    );
                    Some(format!(
                        "It is locked by {} since {}; their container and lock go too.",
                        info.holder(),
                        info.timestamp.to_rfc3339()
                    ))
                }
                _ => None,
            };
            self.guarded_mutation_with(project, "Delete remote copy of", detail, force)
                .await?;
        }

        let sync_terminated = match self.sync.state(&project.resource_name).await? {
            SyncState::Absent => false,
            SyncState::Running | SyncState::Paused => {
                self.sync.terminate(&project.resource_name).await?;
                true
            }
        };
        let session_cleared = self.sessions(project).clear_session()?;

        if remote {
            if self.containers.state(&project.resource_name).await? != ContainerState::Absent {
                self.containers.remove(&project.resource_name).await?;
            }
            self.fs.remove_dir_all(&project.remote_path).await?;
            self.lock.release(name).await?;
        }

        info!(project = name, remote, "project removed");
        Ok(RemoveReport {
            project: name.to_string(),
            sync_terminated,
            session_cleared,
            remote_deleted: remote,
        })
    }

    /// Stamp this machine's session and attach a shell.
    ///
    /// A live session from another machine blocks unless `force` is set.
    pub async fn enter_shell(
        &self,
        project: &ResolvedProject,
        force: bool,
    ) -> Result<ShellReport, ProtocolError> {
        let tracker = self.sessions(project);
        let overrode = match tracker.check_session_conflict()? {
            Some(session) if !force => {
                return Err(ProtocolError::SessionConflict {
                    project: project.name.clone(),
                    session,
                });
            }
            Some(session) => {
                warn!(
                    project = %project.name,
                    holder = %session.holder(),
                    "overriding another machine's session"
                );
                Some(session)
            }
            None => None,
        };

        let session = tracker.write_session()?;
        let exit_code = self.containers.attach_shell(&project.resource_name).await?;
        Ok(ShellReport {
            project: project.name.clone(),
            session,
            overrode,
            exit_code,
        })
    }

    /// Everything Tandem knows about a project, without changing anything.
    ///
    /// Engine failures are logged and reported as unknown.
    pub async fn status(&self, project: &ResolvedProject) -> Result<StatusReport, ProtocolError> {
        let lock = self.lock.read(&project.name).await?;
        let lock_owned_by_me = lock
            .as_valid()
            .is_some_and(|r| r.machine == self.identity.machine);
        let ownership = self
            .ownership
            .get_ownership_status(&project.remote_path)
            .await?;
        let session = self.sessions(project).read_session()?;

        let sync = self
            .sync
            .state(&project.resource_name)
            .await
            .inspect_err(|e| warn!(error = %e, "could not query sync engine"))
            .ok();
        let container = self
            .containers
            .state(&project.resource_name)
            .await
            .inspect_err(|e| warn!(error = %e, "could not query container runtime"))
            .ok();

        Ok(StatusReport {
            project: project.name.clone(),
            lock,
            lock_owned_by_me,
            ownership,
            session,
            sync,
            container,
        })
    }

    /// Release the lock regardless of holder, after confirming when it is
    /// not ours. Returns the record that was removed.
    pub async fn unlock(
        &self,
        project: &ResolvedProject,
        force: bool,
    ) -> Result<Option<LockRecord>, ProtocolError> {
        let name = project.name.as_str();
        let existing = match self.lock.status(name).await? {
            LockStatus::Unlocked => None,
            LockStatus::Locked { owned_by_me, info } => {
                if !owned_by_me && !force {
                    self.confirm(&format!(
                        "Release the lock on '{name}' held by {}?",
                        info.holder()
                    ))?;
                }
                Some(info)
            }
        };
        self.lock.release(name).await?;
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fakes::{FakeContainerRuntime, FakeSyncEngine, RecordingTransfer};
    use crate::protocol::{NonInteractive, ScriptedPrompter};
    use crate::remote::{ExecOutput, MockExecutor};
    use std::path::Path;
    use tempfile::TempDir;

    struct Rig {
        mock: MockExecutor,
        sync: Arc<FakeSyncEngine>,
        containers: Arc<FakeContainerRuntime>,
        transfer: Arc<RecordingTransfer>,
        prompter: Arc<ScriptedPrompter>,
        coordinator: Coordinator,
    }

    fn rig(machine: &str, answers: &[bool]) -> Rig {
        let mock = MockExecutor::new();
        let sync = Arc::new(FakeSyncEngine::new());
        let containers = Arc::new(FakeContainerRuntime::new());
        let transfer = Arc::new(RecordingTransfer::new());
        let prompter = Arc::new(ScriptedPrompter::new(answers.iter().copied()));
        let coordinator = Coordinator::new(
            Arc::new(mock.clone()),
            RemoteHost::new("devbox"),
            "~/tandem",
            Identity::new(machine, "alice"),
            sync.clone(),
            containers.clone(),
            transfer.clone(),
            prompter.clone(),
        );
        Rig {
            mock,
            sync,
            containers,
            transfer,
            prompter,
            coordinator,
        }
    }

    fn project(dir: &Path) -> ResolvedProject {
        ResolvedProject {
            name: "demo".into(),
            local_path: dir.to_path_buf(),
            remote_path: "~/tandem/demo".into(),
            resource_name: "tandem-demo".into(),
        }
    }

    fn foreign_lock() -> ExecOutput {
        ExecOutput::ok(
            "__tandem_present__\n{\"machine\":\"desktop\",\"user\":\"bob\",\"timestamp\":\"2026-01-01T00:00:00Z\",\"pid\":1}",
        )
    }

    #[tokio::test]
    async fn test_start_on_free_project() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[]);
        let report = r.coordinator.start(&project(dir.path()), false).await.unwrap();

        assert!(!report.refreshed);
        assert!(report.took_over_from.is_none());
        assert_eq!(report.sync, SyncAction::Created);
        assert_eq!(report.container, ContainerAction::Started);
        assert!(r.prompter.asked().is_empty());
        assert_eq!(r.containers.current("tandem-demo"), ContainerState::Running);
    }

    #[tokio::test]
    async fn test_start_conflict_declined_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[false]);
        r.mock.respond_on("demo.lock", foreign_lock());

        let err = r.coordinator.start(&project(dir.path()), false).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Aborted(_)));
        assert!(r.prompter.asked()[0].contains("bob@desktop"));
        assert!(r.sync.calls().is_empty());
        assert!(r.containers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_non_interactive_conflict_fails() {
        let dir = TempDir::new().unwrap();
        let mock = MockExecutor::new();
        mock.respond_on("demo.lock", foreign_lock());
        let coordinator = Coordinator::new(
            Arc::new(mock),
            RemoteHost::new("devbox"),
            "~/tandem",
            Identity::new("laptop", "alice"),
            Arc::new(FakeSyncEngine::new()),
            Arc::new(FakeContainerRuntime::new()),
            Arc::new(RecordingTransfer::new()),
            Arc::new(NonInteractive),
        );
        let err = coordinator.start(&project(dir.path()), false).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_start_resumes_paused_sync() {
        let dir = TempDir::new().unwrap();
        let mut r = rig("laptop", &[]);
        let sync = Arc::new(FakeSyncEngine::new().with_session("tandem-demo", SyncState::Paused));
        r.coordinator.sync = sync.clone();
        r.sync = sync;

        let report = r.coordinator.start(&project(dir.path()), false).await.unwrap();
        assert_eq!(report.sync, SyncAction::Resumed);
        assert!(r.sync.calls().contains(&"resume tandem-demo".to_string()));
    }

    #[tokio::test]
    async fn test_stop_with_foreign_lock_leaves_lock_and_container() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[]);
        r.coordinator.start(&project(dir.path()), false).await.unwrap();
        r.mock.respond_on("demo.lock", foreign_lock());

        let report = r.coordinator.stop(&project(dir.path())).await.unwrap();
        assert!(matches!(report.lock, LockDisposition::HeldElsewhere { .. }));
        assert!(report.sync_paused);
        assert!(!report.container_stopped);
        assert!(!r.mock.history().iter().any(|c| c.starts_with("rm -f")));
    }

    #[tokio::test]
    async fn test_stop_survives_flush_failure() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[]);
        r.coordinator.start(&project(dir.path()), false).await.unwrap();
        r.sync.fail("flush");

        let report = r.coordinator.stop(&project(dir.path())).await.unwrap();
        assert!(!report.flushed);
        assert!(report.sync_paused);
        assert!(report.container_stopped);
    }

    #[tokio::test]
    async fn test_push_denied_for_other_owner() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[]);
        r.mock.respond_on(
            "state.lock",
            ExecOutput::ok(
                "__tandem_present__\n{\"ownership\":{\"owner\":\"carol\",\"created\":\"2026-01-01T00:00:00Z\",\"machine\":\"x\"}}",
            ),
        );
        let err = r.coordinator.push(&project(dir.path()), true).await.unwrap_err();
        assert!(err.to_string().contains("carol"));
        assert_eq!(err.exit_code(), 3);
        assert!(r.transfer.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_push_asks_twice_then_claims() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[true, true]);
        let report = r.coordinator.push(&project(dir.path()), false).await.unwrap();

        assert_eq!(r.prompter.asked().len(), 2);
        assert_eq!(r.transfer.uploads().len(), 1);
        assert_eq!(report.ownership_claimed.map(|o| o.owner), Some("alice".into()));
    }

    #[tokio::test]
    async fn test_push_second_confirmation_declined() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[true, false]);
        let err = r.coordinator.push(&project(dir.path()), false).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Aborted(_)));
        assert!(r.transfer.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_shell_conflict_requires_force() {
        let dir = TempDir::new().unwrap();
        let laptop = rig("laptop", &[]);
        laptop.coordinator.start(&project(dir.path()), false).await.unwrap();
        laptop
            .coordinator
            .enter_shell(&project(dir.path()), false)
            .await
            .unwrap();

        let desktop = rig("desktop", &[]);
        desktop
            .containers
            .start("tandem-demo", "~/tandem/demo")
            .await
            .unwrap();
        let err = desktop
            .coordinator
            .enter_shell(&project(dir.path()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SessionConflict { .. }));

        let report = desktop
            .coordinator
            .enter_shell(&project(dir.path()), true)
            .await
            .unwrap();
        assert_eq!(report.overrode.map(|s| s.machine), Some("laptop".into()));
        assert_eq!(report.session.machine, "desktop");
    }

    #[tokio::test]
    async fn test_unlock_foreign_lock_confirms() {
        let dir = TempDir::new().unwrap();
        let r = rig("laptop", &[true]);
        r.mock.respond_on("demo.lock", foreign_lock());
        let released = r.coordinator.unlock(&project(dir.path()), false).await.unwrap();
        assert_eq!(released.map(|l| l.machine), Some("desktop".into()));
        assert_eq!(r.prompter.asked().len(), 1);
    }
}
