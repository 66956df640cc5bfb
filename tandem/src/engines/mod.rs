//! Process-backed collaborators: mutagen for sync, docker for containers,
//! rsync for one-shot pushes.

mod docker;
mod mutagen;
mod process;
mod rsync;

pub use docker::DockerRuntime;
pub use mutagen::MutagenSync;
pub use rsync::RsyncTransfer;

use tandem_common::RemoteHost;
use tandem_common::remote::LOCAL_HOST;

/// Whether `host` means "this machine" rather than an SSH destination.
pub fn is_local(host: &RemoteHost) -> bool {
    host.destination == LOCAL_HOST
}

/// A remote path as the external tools expect it.
///
/// Over SSH, `~/x` becomes `x` (relative to the remote home). For the local
/// host the tilde is expanded here.
pub fn tool_path(host: &RemoteHost, remote_path: &str) -> String {
    if is_local(host) {
        return shellexpand::tilde(remote_path).into_owned();
    }
    match remote_path {
        "~" => ".".to_string(),
        p => p.strip_prefix("~/").unwrap_or(p).to_string(),
    }
}

/// `host:path`, or just the path for the local host.
pub fn endpoint(host: &RemoteHost, remote_path: &str) -> String {
    let path = tool_path(host, remote_path);
    if is_local(host) {
        path
    } else {
        format!("{}:{}", host.destination, path)
    }
}
