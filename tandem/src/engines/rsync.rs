//! One-shot upload of a local checkout with `rsync`.

use super::{endpoint, is_local, process::run_tool};
use async_trait::async_trait;
use std::path::Path;
use tandem_common::protocol::Transfer;
use tandem_common::remote::RemoteFs;
use tandem_common::shell::quote;
use tandem_common::state::STATE_DIR;
use tandem_common::{EngineError, RemoteHost};
use tracing::{debug, info};

/// Per-project exclude list, one pattern per line.
pub const IGNORE_FILE: &str = ".tandemignore";

pub struct RsyncTransfer {
    fs: RemoteFs,
}

impl RsyncTransfer {
    pub fn new(fs: RemoteFs) -> Self {
        Self { fs }
    }
}

/// Parse `.tandemignore` content.
///
/// One pattern per line; blank lines and `#` comments are skipped. Negation
/// (`!`) has no special meaning.
pub fn parse_ignore_content(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn ignore_patterns(local: &Path) -> Vec<String> {
    std::fs::read_to_string(local.join(IGNORE_FILE))
        .map(|content| parse_ignore_content(&content))
        .unwrap_or_default()
}

fn ssh_option(host: &RemoteHost) -> String {
    match &host.identity_file {
        Some(key) => format!("ssh -o BatchMode=yes -i {}", quote(&key.to_string_lossy())),
        None => "ssh -o BatchMode=yes".to_string(),
    }
}

/// Arguments for `rsync`. The remote state directory is never touched so
/// `--delete` cannot drop the ownership record.
fn rsync_args(local: &Path, host: &RemoteHost, remote_path: &str, ignores: &[String]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-az".into(),
        "--delete".into(),
        "--exclude".into(),
        format!("/{STATE_DIR}/"),
        "--exclude".into(),
        ".git/".into(),
    ];
    for pattern in ignores {
        args.push("--exclude".into());
        args.push(pattern.clone());
    }
    if !is_local(host) {
        args.push("-e".into());
        args.push(ssh_option(host));
    }
    args.push(format!("{}/", local.to_string_lossy().trim_end_matches('/')));
    args.push(endpoint(host, remote_path));
    args
}

#[async_trait]
impl Transfer for RsyncTransfer {
    async fn upload(
        &self,
        local: &Path,
        host: &RemoteHost,
        remote_path: &str,
    ) -> Result<(), EngineError> {
        self.fs
            .create_dir_all(remote_path)
            .await
            .map_err(|e| EngineError::Sync(e.to_string()))?;

        let ignores = ignore_patterns(local);
        debug!(excludes = ignores.len(), "loaded {IGNORE_FILE}");
        let args = rsync_args(local, host, remote_path, &ignores);

        info!(local = %local.display(), %host, remote_path, "uploading");
        let output = run_tool("rsync", &args, &[])
            .await
            .map_err(EngineError::Sync)?;
        if !output.success {
            return Err(EngineError::Sync(format!("rsync failed: {}", output.message())));
        }
        Ok(())
    }
}
