use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_common::{
    Identity, LocalExecutor, OwnershipStore, RemoteExecutor, RemoteHost, RemoteLock,
    ResolvedProject,
};
use tempfile::TempDir;

/// A temp directory standing in for the remote host, reached through `sh`.
pub struct RemoteSandbox {
    pub dir: TempDir,
    pub executor: Arc<dyn RemoteExecutor>,
}

impl RemoteSandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create sandbox"),
            executor: Arc::new(LocalExecutor::new()),
        }
    }

    pub fn host(&self) -> RemoteHost {
        RemoteHost::new("local")
    }

    /// Remote base path (absolute, inside the sandbox).
    pub fn base(&self) -> String {
        self.dir.path().join("remote").to_string_lossy().to_string()
    }

    pub fn lock_file(&self, project: &str) -> PathBuf {
        self.dir
            .path()
            .join("remote/.locks")
            .join(format!("{project}.lock"))
    }

    pub fn remote_project(&self, project: &str) -> String {
        format!("{}/{project}", self.base())
    }

    pub fn remote_state_file(&self, project: &str) -> PathBuf {
        self.dir
            .path()
            .join("remote")
            .join(project)
            .join(".state/state.lock")
    }

    pub fn lock_as(&self, machine: &str, user: &str) -> RemoteLock {
        RemoteLock::new(
            Arc::clone(&self.executor),
            self.host(),
            self.base(),
            Identity::new(machine, user),
        )
    }

    pub fn ownership_as(&self, machine: &str, user: &str) -> OwnershipStore {
        OwnershipStore::new(
            Arc::clone(&self.executor),
            self.host(),
            Identity::new(machine, user),
        )
    }

    /// A project whose local checkout lives at `<sandbox>/local/<machine>/<name>`.
    pub fn project(&self, name: &str, local: &Path) -> ResolvedProject {
        ResolvedProject {
            name: name.to_string(),
            local_path: local.to_path_buf(),
            remote_path: self.remote_project(name),
            resource_name: format!("tandem-{name}"),
        }
    }

    pub fn local_checkout(&self, machine: &str, name: &str) -> PathBuf {
        let path = self.dir.path().join("local").join(machine).join(name);
        std::fs::create_dir_all(&path).expect("create checkout");
        path
    }
}
