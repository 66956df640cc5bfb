//! Containers on the remote host through the `docker` CLI.
//!
//! Lifecycle commands run as shell strings over the remote executor. The
//! interactive shell needs a terminal, so it is spawned locally (through
//! `ssh -t` unless the host is local) with inherited stdio.

use super::is_local;
use async_trait::async_trait;
use std::process::Stdio;
use tandem_common::protocol::{ContainerRuntime, ContainerState};
use tandem_common::remote::RemoteFs;
use tandem_common::shell::{escape_path_with_home, quote};
use tandem_common::{EngineError, RemoteError};
use tokio::process::Command;
use tracing::{debug, info};

/// Where the project directory is mounted inside the container.
pub const WORKSPACE: &str = "/workspace";

const ABSENT_MARKER: &str = "__tandem_absent__";

pub struct DockerRuntime {
    fs: RemoteFs,
    image: String,
}

impl DockerRuntime {
    pub fn new(fs: RemoteFs, image: impl Into<String>) -> Self {
        Self {
            fs,
            image: image.into(),
        }
    }

    async fn docker(&self, command: String) -> Result<String, EngineError> {
        self.fs.run(&command).await.map_err(container_error)
    }

    fn run_command(&self, name: &str, remote_path: &str) -> Result<String, EngineError> {
        let dir = escape_path_with_home(remote_path).ok_or_else(|| {
            EngineError::Container(format!("invalid remote path: {remote_path:?}"))
        })?;
        Ok(format!(
            "mkdir -p {dir} && dir=$(cd {dir} && pwd) && docker run -d --name {name} -v \"$dir\":{WORKSPACE} -w {WORKSPACE} {image} sleep infinity",
            name = quote(name),
            image = quote(&self.image),
        ))
    }

    fn shell_command(&self, name: &str) -> Command {
        let docker_args = ["exec", "-it", "-w", WORKSPACE, name, "sh"];
        let host = self.fs.host();
        if is_local(host) {
            let mut cmd = Command::new("docker");
            cmd.args(docker_args);
            return cmd;
        }
        let mut cmd = Command::new("ssh");
        cmd.arg("-t");
        if let Some(key) = &host.identity_file {
            cmd.arg("-i").arg(key);
        }
        let remote = std::iter::once("docker")
            .chain(docker_args)
            .map(|a| quote(a).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        cmd.arg(&host.destination).arg(remote);
        cmd
    }
}

fn container_error(err: RemoteError) -> EngineError {
    EngineError::Container(err.to_string())
}

fn parse_running(stdout: &str) -> ContainerState {
    match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some("true") => ContainerState::Running,
        Some("false") => ContainerState::Stopped,
        _ => ContainerState::Absent,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn state(&self, name: &str) -> Result<ContainerState, EngineError> {
        let stdout = self
            .docker(format!(
                "docker inspect -f '{{{{.State.Running}}}}' {} 2>/dev/null || echo {ABSENT_MARKER}",
                quote(name)
            ))
            .await?;
        Ok(parse_running(&stdout))
    }

    async fn start(&self, name: &str, remote_path: &str) -> Result<(), EngineError> {
        match self.state(name).await? {
            ContainerState::Running => return Ok(()),
            ContainerState::Stopped => {
                self.docker(format!("docker start {}", quote(name))).await?;
            }
            ContainerState::Absent => {
                let command = self.run_command(name, remote_path)?;
                self.docker(command).await?;
                info!(container = name, image = %self.image, "created container");
            }
        }
        debug!(container = name, "container running");
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.docker(format!("docker stop {}", quote(name))).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.docker(format!("docker rm -f {}", quote(name))).await?;
        Ok(())
    }

    async fn attach_shell(&self, name: &str) -> Result<i32, EngineError> {
        let status = self
            .shell_command(name)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| EngineError::Container(format!("failed to attach to {name}: {e}")))?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_common::remote::LocalExecutor;
    use tandem_common::RemoteHost;

    fn runtime(host: &str) -> DockerRuntime {
        let fs = RemoteFs::new(Arc::new(LocalExecutor::new()), RemoteHost::new(host));
        DockerRuntime::new(fs, "debian:bookworm")
    }

    #[test]
    fn test_parse_running() {
        assert_eq!(parse_running("true\n"), ContainerState::Running);
        assert_eq!(parse_running("false\n"), ContainerState::Stopped);
        assert_eq!(parse_running(ABSENT_MARKER), ContainerState::Absent);
        assert_eq!(parse_running(""), ContainerState::Absent);
    }

    #[test]
    fn test_run_command_mounts_resolved_project_dir() {
        let cmd = runtime("me@devbox")
            .run_command("tandem-demo", "~/tandem/demo")
            .unwrap();
        assert!(cmd.starts_with("mkdir -p \"$HOME\"/tandem/demo"));
        assert!(cmd.contains("--name tandem-demo"));
        assert!(cmd.contains("-v \"$dir\":/workspace"));
        assert!(cmd.ends_with("debian:bookworm sleep infinity"));
    }

    #[test]
    fn test_run_command_rejects_control_characters() {
        assert!(runtime("me@devbox").run_command("x", "~/a\nb").is_err());
    }

    #[test]
    fn test_shell_goes_through_ssh_for_remote_hosts() {
        let cmd = runtime("me@devbox").shell_command("tandem-demo");
        assert_eq!(cmd.as_std().get_program(), "ssh");
        let local = runtime("local").shell_command("tandem-demo");
        assert_eq!(local.as_std().get_program(), "docker");
    }
}
