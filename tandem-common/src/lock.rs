//! Remote advisory lock serializing `start` across machines.
//!
//! The lock is a JSON record at `<base>/.locks/<project>.lock` on the remote
//! host. The remote filesystem offers no check-and-set, so two machines
//! acquiring at the same instant can both observe "absent" and both write.
//! Tandem accepts that race: one operator, one acquisition at a time.

use crate::config::validate_project_name;
use crate::error::RemoteError;
use crate::identity::Identity;
use crate::readout::Readout;
use crate::remote::{RemoteExecutor, RemoteFs, RemoteHost};
use crate::shell::join_remote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Directory under the remote base path holding lock files.
pub const LOCKS_DIR: &str = ".locks";

/// Who holds a project lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub machine: String,
    pub user: String,
    /// Acquisition time, refreshed on re-acquisition by the same machine.
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
}

impl LockRecord {
    pub fn new(identity: &Identity, timestamp: DateTime<Utc>) -> Self {
        Self {
            machine: identity.machine.clone(),
            user: identity.user.clone(),
            timestamp,
            pid: identity.pid,
        }
    }

    /// `user@machine`
    pub fn holder(&self) -> String {
        format!("{}@{}", self.user, self.machine)
    }
}

/// Result of [`RemoteLock::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock is ours. `refreshed` is true when we already held it.
    Acquired { record: LockRecord, refreshed: bool },
    /// Another machine holds it; nothing was written.
    Held { existing: LockRecord },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    pub fn existing(&self) -> Option<&LockRecord> {
        match self {
            Self::Held { existing } => Some(existing),
            Self::Acquired { .. } => None,
        }
    }
}

/// Result of [`RemoteLock::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked { owned_by_me: bool, info: LockRecord },
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn owned_by_me(&self) -> bool {
        matches!(self, Self::Locked { owned_by_me: true, .. })
    }
}

/// Advisory lock over the remote filesystem.
#[derive(Clone)]
pub struct RemoteLock {
    fs: RemoteFs,
    base_path: String,
    identity: Identity,
}

impl RemoteLock {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        host: RemoteHost,
        base_path: impl Into<String>,
        identity: Identity,
    ) -> Self {
        Self {
            fs: RemoteFs::new(executor, host),
            base_path: base_path.into(),
            identity,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// `<base>/.locks/<project>.lock`
    ///
    /// `project` must be a valid project name; anything else could escape
    /// the locks directory.
    pub fn lock_path(&self, project: &str) -> Result<String, RemoteError> {
        validate_project_name(project)
            .map_err(|_| RemoteError::InvalidPath(format!("{project}.lock")))?;
        Ok(join_remote(
            &join_remote(&self.base_path, LOCKS_DIR),
            &format!("{project}.lock"),
        ))
    }

    /// Read the raw record, distinguishing absent from damaged.
    pub async fn read(&self, project: &str) -> Result<Readout<LockRecord>, RemoteError> {
        let readout = self
            .fs
            .read_file(&self.lock_path(project)?)
            .await?
            .into_readout(Readout::from_json);
        if let Readout::Corrupt(ref reason) = readout {
            warn!(project, reason = %reason, "lock record is unreadable; treating as unlocked");
        }
        Ok(readout)
    }

    /// Take the lock for this machine.
    ///
    /// Absent or corrupt records count as unlocked. Re-acquiring a lock this
    /// machine already holds refreshes its timestamp. A lock held by another
    /// machine is reported, never overwritten; see [`Self::force_takeover`].
    pub async fn acquire(&self, project: &str) -> Result<AcquireOutcome, RemoteError> {
        let refreshed = match self.read(project).await? {
            Readout::Valid(existing) if existing.machine != self.identity.machine => {
                info!(
                    project,
                    holder = %existing.holder(),
                    since = %existing.timestamp,
                    "lock held by another machine"
                );
                return Ok(AcquireOutcome::Held { existing });
            }
            Readout::Valid(_) => true,
            Readout::Absent | Readout::Corrupt(_) => false,
        };

        let record = LockRecord::new(&self.identity, Utc::now());
        self.write(project, &record).await?;
        info!(
            project,
            machine = %record.machine,
            user = %record.user,
            refreshed,
            "lock acquired"
        );
        Ok(AcquireOutcome::Acquired { record, refreshed })
    }

    /// Delete the lock record.
    ///
    /// Does not check who holds it; callers that care consult [`Self::status`].
    pub async fn release(&self, project: &str) -> Result<(), RemoteError> {
        self.fs.remove_file(&self.lock_path(project)?).await?;
        info!(project, machine = %self.identity.machine, "lock released");
        Ok(())
    }

    pub async fn status(&self, project: &str) -> Result<LockStatus, RemoteError> {
        Ok(match self.read(project).await? {
            Readout::Valid(info) => LockStatus::Locked {
                owned_by_me: info.machine == self.identity.machine,
                info,
            },
            Readout::Absent | Readout::Corrupt(_) => LockStatus::Unlocked,
        })
    }

    /// Release whatever lock exists, then acquire it.
    ///
    /// Only call after the operator has confirmed the takeover.
    pub async fn force_takeover(&self, project: &str) -> Result<AcquireOutcome, RemoteError> {
        if let Readout::Valid(previous) = self.read(project).await? {
            warn!(
                project,
                previous = %previous.holder(),
                "forcing lock takeover"
            );
        }
        self.release(project).await?;
        self.acquire(project).await
    }

    async fn write(&self, project: &str, record: &LockRecord) -> Result<(), RemoteError> {
        let payload = serde_json::to_string_pretty(record)
            .map_err(|e| RemoteError::Payload(e.to_string()))?;
        self.fs.write_file(&self.lock_path(project)?, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ExecOutput, MockExecutor};

    fn lock_for(machine: &str, mock: &MockExecutor) -> RemoteLock {
        RemoteLock::new(
            Arc::new(mock.clone()),
            RemoteHost::new("devbox"),
            "~/tandem",
            Identity::new(machine, "alice").with_pid(100),
        )
    }

    #[test]
    fn test_lock_path() {
        let lock = lock_for("laptop", &MockExecutor::new());
        assert_eq!(lock.lock_path("demo").unwrap(), "~/tandem/.locks/demo.lock");
        for bad in ["../escape", "a/b", "", ".hidden"] {
            assert!(
                matches!(lock.lock_path(bad), Err(RemoteError::InvalidPath(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_record_roundtrip_json_shape() {
        let id = Identity::new("laptop", "alice").with_pid(9);
        let record = LockRecord::new(&id, Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 4);
        for key in ["machine", "user", "timestamp", "pid"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(record.holder(), "alice@laptop");
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error_not_unlocked() {
        let mock = MockExecutor::new();
        mock.unreachable("no route to host");
        let lock = lock_for("laptop", &mock);

        assert!(matches!(
            lock.status("demo").await,
            Err(RemoteError::Connection { .. })
        ));
        assert!(lock.acquire("demo").await.is_err());
    }

    #[tokio::test]
    async fn test_acquire_on_empty_remote_writes_record() {
        let mock = MockExecutor::new();
        let lock = lock_for("laptop", &mock);

        let outcome = lock.acquire("demo").await.unwrap();
        assert!(matches!(
            outcome,
            AcquireOutcome::Acquired {
                refreshed: false,
                ..
            }
        ));
        let history = mock.history();
        assert_eq!(history.len(), 2);
        assert!(history[1].contains("mv -f"));
        assert!(history[1].contains("\"$HOME\"/tandem/.locks/demo.lock"));
    }

    #[tokio::test]
    async fn test_release_is_rm_f() {
        let mock = MockExecutor::new();
        let lock = lock_for("laptop", &mock);
        lock.release("demo").await.unwrap();
        assert_eq!(
            mock.history(),
            vec!["rm -f \"$HOME\"/tandem/.locks/demo.lock".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_project_never_reaches_remote() {
        let mock = MockExecutor::new();
        let lock = lock_for("laptop", &mock);
        assert!(matches!(
            lock.acquire("../../etc/x").await,
            Err(RemoteError::InvalidPath(_))
        ));
        assert!(lock.release("a/b").await.is_err());
        assert!(mock.history().is_empty());
    }

    fn foreign_lock_after_banner() -> ExecOutput {
        let record = LockRecord::new(&Identity::new("desktop", "bob").with_pid(7), Utc::now());
        ExecOutput::ok(format!(
            "Welcome to devbox\n__tandem_present__\n{}",
            serde_json::to_string(&record).unwrap()
        ))
    }

    #[tokio::test]
    async fn test_login_banner_does_not_hide_foreign_lock() {
        let mock = MockExecutor::new();
        mock.respond_on("if [ -f", foreign_lock_after_banner());
        let lock = lock_for("laptop", &mock);

        match lock.read("demo").await.unwrap() {
            Readout::Valid(record) => assert_eq!(record.holder(), "bob@desktop"),
            other => panic!("expected the desktop lock, got {other:?}"),
        }
        assert!(!lock.status("demo").await.unwrap().owned_by_me());
        let outcome = lock.acquire("demo").await.unwrap();
        assert_eq!(outcome.existing().map(|l| l.machine.as_str()), Some("desktop"));
        assert!(!mock.history().iter().any(|c| c.contains("mv -f")));
    }

    #[tokio::test]
    async fn test_output_without_marker_reads_corrupt() {
        let mock = MockExecutor::new();
        mock.respond_on("if [ -f", ExecOutput::ok("motd: maintenance tonight\n"));
        let lock = lock_for("laptop", &mock);
        assert!(lock.read("demo").await.unwrap().is_corrupt());
    }
}
