//! File operations on the remote host built from shell fragments.

use super::{RemoteExecutor, RemoteHost};
use crate::error::RemoteError;
use crate::shell::{self, FileRead};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A remote filesystem reachable through a [`RemoteExecutor`].
#[derive(Clone)]
pub struct RemoteFs {
    executor: Arc<dyn RemoteExecutor>,
    host: RemoteHost,
}

impl RemoteFs {
    pub fn new(executor: Arc<dyn RemoteExecutor>, host: RemoteHost) -> Self {
        Self { executor, host }
    }

    pub fn host(&self) -> &RemoteHost {
        &self.host
    }

    /// Run a command and return stdout, mapping a non-zero exit to an error.
    pub async fn run(&self, command: &str) -> Result<String, RemoteError> {
        trace!(host = %self.host, command, "remote exec");
        let output = self.executor.execute(&self.host, command).await?;
        output.into_stdout(&self.host)
    }

    /// Contents of `path`, telling a missing file from output that is not
    /// a file at all.
    pub async fn read_file(&self, path: &str) -> Result<FileRead, RemoteError> {
        let cmd = shell::read_file_command(path)?;
        let stdout = self.run(&cmd).await?;
        let contents = shell::parse_read_output(&stdout);
        match &contents {
            FileRead::Unrecognized(output) => {
                warn!(host = %self.host, path, %output, "remote read printed no file marker");
            }
            read => {
                debug!(host = %self.host, path, present = matches!(read, FileRead::Present(_)), "read remote file");
            }
        }
        Ok(contents)
    }

    /// Atomically replace `path`, creating parent directories.
    pub async fn write_file(&self, path: &str, contents: &str) -> Result<(), RemoteError> {
        let cmd = shell::write_file_command(path, contents)?;
        self.run(&cmd).await?;
        debug!(host = %self.host, path, bytes = contents.len(), "wrote remote file");
        Ok(())
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        let cmd = shell::remove_file_command(path)?;
        self.run(&cmd).await?;
        debug!(host = %self.host, path, "removed remote file");
        Ok(())
    }

    pub async fn remove_dir_all(&self, path: &str) -> Result<(), RemoteError> {
        let cmd = shell::remove_dir_command(path)?;
        self.run(&cmd).await?;
        debug!(host = %self.host, path, "removed remote directory");
        Ok(())
    }

    pub async fn create_dir_all(&self, path: &str) -> Result<(), RemoteError> {
        let cmd = shell::mkdir_command(path)?;
        self.run(&cmd).await?;
        Ok(())
    }
}
