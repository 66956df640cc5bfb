//! Lifecycle commands end to end, with the remote host in a temp directory
//! and in-memory sync/container collaborators.

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::{RemoteSandbox, init_test_logging};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tandem_common::protocol::fakes::{FakeContainerRuntime, FakeSyncEngine, RecordingTransfer};
use tandem_common::protocol::{LockDisposition, ScriptedPrompter, SyncAction};
use tandem_common::state::SessionRecord;
use tandem_common::{
    ContainerState, Coordinator, EngineError, Identity, LocalStateStore, NonInteractive,
    Prompter, ProtocolError, Readout, RemoteHost, SyncEngine, SyncState,
};

struct Machine {
    coordinator: Coordinator,
    sync: Arc<FakeSyncEngine>,
    containers: Arc<FakeContainerRuntime>,
    transfer: Arc<RecordingTransfer>,
}

fn machine(
    sandbox: &RemoteSandbox,
    name: &str,
    user: &str,
    containers: Arc<FakeContainerRuntime>,
    prompter: Arc<dyn Prompter>,
) -> Machine {
    let sync = Arc::new(FakeSyncEngine::new());
    let transfer = Arc::new(RecordingTransfer::new());
    let coordinator = Coordinator::new(
        Arc::clone(&sandbox.executor),
        sandbox.host(),
        &sandbox.base(),
        Identity::new(name, user),
        sync.clone(),
        containers.clone(),
        transfer.clone(),
        prompter,
    );
    Machine {
        coordinator,
        sync,
        containers,
        transfer,
    }
}

#[tokio::test]
async fn test_start_stop_handoff_between_machines() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    // One container runtime: both machines drive the same remote docker.
    let docker = Arc::new(FakeContainerRuntime::new());
    let laptop = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let desktop = machine(&sandbox, "desktop", "alice", docker.clone(), Arc::new(NonInteractive));
    let on_laptop = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));
    let on_desktop = sandbox.project("demo", &sandbox.local_checkout("desktop", "demo"));

    let report = laptop.coordinator.start(&on_laptop, false).await.unwrap();
    assert_eq!(report.sync, SyncAction::Created);
    assert_eq!(docker.current("tandem-demo"), ContainerState::Running);

    let err = desktop.coordinator.start(&on_desktop, false).await.unwrap_err();
    assert!(matches!(err, ProtocolError::PromptUnavailable(_)));
    assert!(desktop.sync.calls().is_empty());

    let stopped = laptop.coordinator.stop(&on_laptop).await.unwrap();
    assert_eq!(stopped.lock, LockDisposition::Released);
    assert!(stopped.flushed);
    assert!(stopped.container_stopped);
    assert!(!sandbox.lock_file("demo").exists());

    let report = desktop.coordinator.start(&on_desktop, false).await.unwrap();
    assert!(report.took_over_from.is_none());
    assert_eq!(report.lock.machine, "desktop");
}

#[tokio::test]
async fn test_confirmed_takeover() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let laptop = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let prompter = Arc::new(ScriptedPrompter::new([true]));
    let desktop = machine(&sandbox, "desktop", "alice", docker.clone(), prompter.clone());
    let on_laptop = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));
    let on_desktop = sandbox.project("demo", &sandbox.local_checkout("desktop", "demo"));

    laptop.coordinator.start(&on_laptop, false).await.unwrap();
    let report = desktop.coordinator.start(&on_desktop, false).await.unwrap();

    assert_eq!(report.took_over_from.map(|l| l.machine), Some("laptop".into()));
    assert!(prompter.asked()[0].contains("alice@laptop"));

    // The laptop's stop now leaves the desktop's lock and container alone.
    let stopped = laptop.coordinator.stop(&on_laptop).await.unwrap();
    assert!(matches!(stopped.lock, LockDisposition::HeldElsewhere { .. }));
    assert!(!stopped.container_stopped);
    assert!(sandbox.lock_file("demo").exists());
    assert_eq!(laptop.sync.calls().last().map(String::as_str), Some("pause tandem-demo"));
}

#[tokio::test]
async fn test_first_push_claims_and_blocks_other_accounts() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let alice = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let bob = machine(&sandbox, "desktop", "bob", docker.clone(), Arc::new(NonInteractive));
    let project = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));

    // Non-interactive without --force cannot get past the confirmations.
    let err = alice.coordinator.push(&project, false).await.unwrap_err();
    assert!(matches!(err, ProtocolError::PromptUnavailable(_)));
    assert!(alice.transfer.uploads().is_empty());

    let report = alice.coordinator.push(&project, true).await.unwrap();
    assert_eq!(report.ownership_claimed.unwrap().owner, "alice");
    assert!(sandbox.remote_state_file("demo").exists());

    // A second push by the owner does not re-stamp.
    let report = alice.coordinator.push(&project, true).await.unwrap();
    assert!(report.ownership_claimed.is_none());

    let err = bob.coordinator.push(&project, true).await.unwrap_err();
    match err {
        ProtocolError::OwnershipDenied { owner, .. } => assert_eq!(owner.owner, "alice"),
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(bob.transfer.uploads().is_empty());

    let err = bob.coordinator.remove(&project, true, true).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(sandbox.remote_state_file("demo").exists());
}

#[tokio::test]
async fn test_remove_remote_deletes_copy_and_lock() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let alice = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let project = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));

    alice.coordinator.push(&project, true).await.unwrap();
    alice.coordinator.start(&project, false).await.unwrap();

    let report = alice.coordinator.remove(&project, true, true).await.unwrap();
    assert!(report.remote_deleted);
    assert!(report.sync_terminated);
    assert!(!sandbox.remote_state_file("demo").exists());
    assert!(!sandbox.lock_file("demo").exists());
    assert_eq!(docker.current("tandem-demo"), ContainerState::Absent);
    assert!(project.local_path.exists());
    assert_eq!(alice.sync.calls().last().map(String::as_str), Some("terminate tandem-demo"));
}

#[tokio::test]
async fn test_shell_session_gates_other_machines() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new().with_shell_exit(0));
    let laptop = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let desktop = machine(&sandbox, "desktop", "alice", docker.clone(), Arc::new(NonInteractive));
    // The synced checkout: both machines see the same state document.
    let checkout = sandbox.local_checkout("shared", "demo");
    let project = sandbox.project("demo", &checkout);

    laptop.coordinator.start(&project, false).await.unwrap();
    let shell = laptop.coordinator.enter_shell(&project, false).await.unwrap();
    assert_eq!(shell.exit_code, 0);
    assert!(shell.overrode.is_none());

    let err = desktop.coordinator.enter_shell(&project, false).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);

    // Stopping on the laptop clears its session, freeing the desktop.
    laptop.coordinator.stop(&project).await.unwrap();
    desktop.coordinator.start(&project, false).await.unwrap();
    let shell = desktop.coordinator.enter_shell(&project, false).await.unwrap();
    assert_eq!(shell.session.machine, "desktop");
}

#[tokio::test]
async fn test_status_reports_each_record() {
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let alice = machine(&sandbox, "laptop", "alice", docker, Arc::new(NonInteractive));
    let project = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));

    let before = alice.coordinator.status(&project).await.unwrap();
    assert!(before.lock.is_absent());
    assert!(before.ownership.is_absent());
    assert_eq!(before.sync, Some(SyncState::Absent));

    alice.coordinator.push(&project, true).await.unwrap();
    alice.coordinator.start(&project, false).await.unwrap();

    let after = alice.coordinator.status(&project).await.unwrap();
    assert!(after.lock_owned_by_me);
    assert!(matches!(after.ownership, Readout::Valid(ref o) if o.owner == "alice"));
    assert_eq!(after.sync, Some(SyncState::Running));
    assert_eq!(after.container, Some(ContainerState::Running));
    assert!(alice.containers.calls().iter().any(|c| c == "start tandem-demo"));
}

/// A running sync session that notes, at every call, whether the local state
/// document still carries a session record.
struct SessionWatchingSync {
    checkout: PathBuf,
    seen: Mutex<Vec<(&'static str, bool)>>,
}

impl SessionWatchingSync {
    fn new(checkout: &Path) -> Self {
        Self {
            checkout: checkout.to_path_buf(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn note(&self, op: &'static str) {
        let on_disk = matches!(
            LocalStateStore::for_project(&self.checkout).read_section::<SessionRecord>(),
            Ok(Readout::Valid(_))
        );
        self.seen.lock().unwrap().push((op, on_disk));
    }

    fn seen(&self) -> Vec<(&'static str, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncEngine for SessionWatchingSync {
    async fn state(&self, _name: &str) -> Result<SyncState, EngineError> {
        Ok(SyncState::Running)
    }

    async fn create(
        &self,
        _name: &str,
        _local: &Path,
        _host: &RemoteHost,
        _remote_path: &str,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn pause(&self, _name: &str) -> Result<(), EngineError> {
        self.note("pause");
        Ok(())
    }

    async fn resume(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn flush(&self, _name: &str) -> Result<(), EngineError> {
        self.note("flush");
        Ok(())
    }

    async fn terminate(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_stop_clears_session_before_final_flush() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let checkout = sandbox.local_checkout("laptop", "demo");
    let project = sandbox.project("demo", &checkout);
    let sync = Arc::new(SessionWatchingSync::new(&checkout));
    let coordinator = Coordinator::new(
        Arc::clone(&sandbox.executor),
        sandbox.host(),
        &sandbox.base(),
        Identity::new("laptop", "alice"),
        sync.clone(),
        Arc::new(FakeContainerRuntime::new()),
        Arc::new(RecordingTransfer::new()),
        Arc::new(NonInteractive),
    );

    coordinator.sessions(&project).write_session().unwrap();
    let report = coordinator.stop(&project).await.unwrap();

    assert!(report.session_cleared);
    assert!(report.flushed);
    // The flush is what carries the deletion to the remote copy.
    assert_eq!(sync.seen(), vec![("flush", false), ("pause", false)]);
}

#[tokio::test]
async fn test_remove_remote_names_the_lock_holder() {
    init_test_logging();
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let laptop = machine(&sandbox, "laptop", "alice", docker.clone(), Arc::new(NonInteractive));
    let prompter = Arc::new(ScriptedPrompter::new([true, true]));
    let desktop = machine(&sandbox, "desktop", "alice", docker.clone(), prompter.clone());
    let on_laptop = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));
    let on_desktop = sandbox.project("demo", &sandbox.local_checkout("desktop", "demo"));

    laptop.coordinator.start(&on_laptop, false).await.unwrap();
    let report = desktop.coordinator.remove(&on_desktop, true, false).await.unwrap();

    assert!(report.remote_deleted);
    let asked = prompter.asked();
    assert_eq!(asked.len(), 2);
    assert!(asked[0].contains("locked by alice@laptop"), "{}", asked[0]);
    assert!(!sandbox.lock_file("demo").exists());
}

#[tokio::test]
async fn test_remove_remote_of_own_lock_does_not_mention_holder() {
    let sandbox = RemoteSandbox::new();
    let docker = Arc::new(FakeContainerRuntime::new());
    let prompter = Arc::new(ScriptedPrompter::new([true, true]));
    let laptop = machine(&sandbox, "laptop", "alice", docker, prompter.clone());
    let project = sandbox.project("demo", &sandbox.local_checkout("laptop", "demo"));

    laptop.coordinator.start(&project, false).await.unwrap();
    laptop.coordinator.remove(&project, true, false).await.unwrap();
    assert!(!prompter.asked()[0].contains("locked by"));
}
