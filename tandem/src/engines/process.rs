use std::ffi::OsStr;
use tokio::process::Command;
use tracing::trace;

/// Captured result of an external tool.
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stderr if there is any, otherwise stdout, trimmed.
    pub fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program` to completion, capturing its output.
///
/// Spawn failures (tool not installed) are returned as `Err` with a
/// readable message.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    envs: &[(&str, String)],
) -> Result<ToolOutput, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    trace!(?cmd, "running tool");
    let output = cmd
        .output()
        .await
        .map_err(|e| format!("failed to run {program}: {e}"))?;
    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
