//! Local machine identity.
//!
//! Every record Tandem writes is stamped with the machine's hostname, the OS
//! account name and the process id. Identity is captured once at startup
//! and passed explicitly into each store so tests can use synthetic
//! machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Hostname; lock and session ownership compare on this.
    pub machine: String,
    /// OS account name; remote ownership compares on this.
    pub user: String,
    /// Process id of the current invocation.
    pub pid: u32,
}

impl Identity {
    /// Build an identity for the current process.
    pub fn new(machine: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            user: user.into(),
            pid: std::process::id(),
        }
    }

    /// Override the recorded pid.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Detect hostname and account name from the operating system.
    ///
    /// Falls back to `"unknown"` rather than failing: a missing hostname
    /// should not prevent read-only commands like `status`.
    pub fn detect() -> Self {
        let machine = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let user = whoami::username().unwrap_or_else(|_| "unknown".to_string());
        Self::new(machine, user)
    }

    /// Apply explicit overrides (from config or environment) on top of this identity.
    pub fn with_overrides(mut self, machine: Option<&str>, user: Option<&str>) -> Self {
        if let Some(machine) = machine.filter(|m| !m.trim().is_empty()) {
            self.machine = machine.to_string();
        }
        if let Some(user) = user.filter(|u| !u.trim().is_empty()) {
            self.user = user.to_string();
        }
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.machine)
    }
}
