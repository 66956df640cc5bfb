//! Wiring from configuration to a ready [`Coordinator`].

use crate::engines::{DockerRuntime, MutagenSync, RsyncTransfer, is_local};
use crate::prompt;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_common::remote::RemoteFs;
use tandem_common::{
    Coordinator, LocalExecutor, RemoteExecutor, RemoteHost, SessionKey, TandemConfig,
};
use tracing::{debug, warn};

pub struct Context {
    pub config: TandemConfig,
    config_path: Option<PathBuf>,
    pub coordinator: Coordinator,
}

impl Context {
    pub fn load(explicit: Option<&Path>, non_interactive: bool) -> Result<Self> {
        let config = TandemConfig::load(explicit)?;
        let config_path = explicit.map(Path::to_path_buf).or_else(TandemConfig::default_path);
        let host = config.remote_host()?;
        let identity = config.identity();
        debug!(host = %host, machine = %identity.machine, user = %identity.user, "loaded context");

        let executor = executor_for(&host)?;
        let fs = RemoteFs::new(Arc::clone(&executor), host.clone());
        let coordinator = Coordinator::new(
            executor,
            host,
            &config.remote.base_path,
            identity,
            Arc::new(MutagenSync::new()),
            Arc::new(DockerRuntime::new(fs.clone(), config.container.image.clone())),
            Arc::new(RsyncTransfer::new(fs)),
            prompt::select(non_interactive),
        )
        .with_session(SessionKey::default(), config.session_ttl());

        Ok(Self {
            config,
            config_path,
            coordinator,
        })
    }

    /// Persist project registrations. Without a config location this only warns.
    pub fn save_config(&self) -> Result<()> {
        match &self.config_path {
            Some(path) => self
                .config
                .save(path)
                .with_context(|| format!("saving {}", path.display())),
            None => {
                warn!("no configuration directory; project list not saved");
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn executor_for(host: &RemoteHost) -> Result<Arc<dyn RemoteExecutor>> {
    if is_local(host) {
        Ok(Arc::new(LocalExecutor::new()))
    } else {
        Ok(Arc::new(tandem_common::SshExecutor::new()))
    }
}

#[cfg(not(unix))]
fn executor_for(host: &RemoteHost) -> Result<Arc<dyn RemoteExecutor>> {
    if is_local(host) {
        Ok(Arc::new(LocalExecutor::new()))
    } else {
        anyhow::bail!("remote hosts over SSH are only supported on Unix")
    }
}
