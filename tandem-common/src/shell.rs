//! POSIX shell fragments for the remote filesystem.
//!
//! All remote reads and writes go through `sh` on the remote host, so every
//! interpolated path and payload is quoted here. Callers never build
//! command strings by hand.

use crate::error::RemoteError;
use crate::readout::Readout;
use std::borrow::Cow;

/// Marker printed before file contents so "missing" and "empty" differ.
const PRESENT_MARKER: &str = "__tandem_present__";

/// Quote an arbitrary value for a POSIX shell.
pub fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

/// Quote a remote path, keeping a leading `~` expandable as `$HOME`.
///
/// Returns `None` if the path contains control characters, which cannot be
/// passed safely through `ssh` command lines.
pub fn escape_path_with_home(path: &str) -> Option<Cow<'_, str>> {
    if path.is_empty() || path.chars().any(char::is_control) {
        return None;
    }
    if path == "~" {
        return Some(Cow::Borrowed("\"$HOME\""));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return Some(Cow::Borrowed("\"$HOME\""));
        }
        return Some(Cow::Owned(format!("\"$HOME\"/{}", quote(rest))));
    }
    Some(quote(path))
}

fn escaped(path: &str) -> Result<String, RemoteError> {
    escape_path_with_home(path)
        .map(Cow::into_owned)
        .ok_or_else(|| RemoteError::InvalidPath(path.to_string()))
}

/// Join remote path segments with `/`, without touching quoting.
pub fn join_remote(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    if base.is_empty() {
        format!("/{segment}")
    } else {
        format!("{base}/{segment}")
    }
}

/// Parent directory of a remote path (string based; the remote is POSIX).
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Print a file's contents prefixed by a marker line, or nothing if absent.
pub fn read_file_command(path: &str) -> Result<String, RemoteError> {
    let p = escaped(path)?;
    Ok(format!(
        "if [ -f {p} ]; then printf '%s\\n' {PRESENT_MARKER}; cat {p}; fi"
    ))
}

/// What [`read_file_command`] printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRead {
    Present(String),
    Missing,
    /// Output without the marker line: something other than the file.
    Unrecognized(String),
}

impl FileRead {
    /// Parse present contents with `parse`; unrecognized output is corrupt.
    pub fn into_readout<T>(self, parse: impl FnOnce(Option<&str>) -> Readout<T>) -> Readout<T> {
        match self {
            Self::Present(contents) => parse(Some(contents.as_str())),
            Self::Missing => parse(None),
            Self::Unrecognized(output) => {
                Readout::Corrupt(format!("unexpected output from remote read: {output}"))
            }
        }
    }
}

/// Split the output of [`read_file_command`] into file contents.
///
/// The marker may follow other output (login banners, shell rc noise); the
/// first line equal to it starts the contents.
pub fn parse_read_output(stdout: &str) -> FileRead {
    let marker_line = format!("{PRESENT_MARKER}\n");
    let start = if stdout.starts_with(&marker_line) {
        Some(0)
    } else {
        stdout
            .find(&format!("\n{marker_line}"))
            .map(|idx| idx + 1)
    };
    match start {
        Some(idx) => FileRead::Present(stdout[idx + marker_line.len()..].to_string()),
        None if stdout.trim().is_empty() => FileRead::Missing,
        None => {
            let excerpt: String = stdout.trim().chars().take(120).collect();
            FileRead::Unrecognized(excerpt)
        }
    }
}

/// Write `contents` atomically: temp file in the same directory, then rename.
pub fn write_file_command(path: &str, contents: &str) -> Result<String, RemoteError> {
    let parent = remote_parent(path).ok_or_else(|| RemoteError::InvalidPath(path.to_string()))?;
    let dir = escaped(parent)?;
    let p = escaped(path)?;
    Ok(format!(
        "mkdir -p {dir} && printf '%s' {payload} > {p}.tmp.$$ && mv -f {p}.tmp.$$ {p}",
        payload = quote(contents)
    ))
}

/// Remove a single file; succeeds when it is already gone.
pub fn remove_file_command(path: &str) -> Result<String, RemoteError> {
    Ok(format!("rm -f {}", escaped(path)?))
}

/// Recursively remove a directory.
///
/// Refuses paths that would resolve to `/` or `$HOME` itself.
pub fn remove_dir_command(path: &str) -> Result<String, RemoteError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "~" || trimmed == "/" {
        return Err(RemoteError::InvalidPath(path.to_string()));
    }
    Ok(format!("rm -rf {}", escaped(trimmed)?))
}

/// Create a directory (and parents).
pub fn mkdir_command(path: &str) -> Result<String, RemoteError> {
    Ok(format!("mkdir -p {}", escaped(path)?))
}
