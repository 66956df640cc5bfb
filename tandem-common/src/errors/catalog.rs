//! Error codes, categories and remediation text.
//!
//! Each variant maps to a unique code in the `TDM-Exxx` format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all Tandem error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// Project is not declared in the configuration
    ConfigProjectNotFound,
    /// No remote host configured
    ConfigRemoteMissing,
    /// Project name or path is not usable
    ConfigInvalidProject,
    /// Configuration file could not be written
    ConfigWriteError,

    // =========================================================================
    // Remote Errors (E100-E199)
    // =========================================================================
    /// Could not reach the remote host
    RemoteConnectionFailed,
    /// Remote command ran but reported failure
    RemoteCommandFailed,
    /// Remote path cannot be safely quoted
    RemoteInvalidPath,

    // =========================================================================
    // Coordination Errors (E200-E299)
    // =========================================================================
    /// Project lock is held by another machine
    LockHeld,
    /// Remote project is owned by another account
    OwnershipDenied,
    /// Another machine has a live interactive session
    SessionConflict,
    /// A confirmation was required but no terminal is available
    PromptUnavailable,
    /// The operator declined a confirmation
    OperationAborted,

    // =========================================================================
    // State Errors (E300-E399)
    // =========================================================================
    /// Local state document could not be read
    StateReadFailed,
    /// Local state document could not be written
    StateWriteFailed,
    /// State record failed to serialize
    StateEncodeFailed,

    // =========================================================================
    // Engine Errors (E400-E499)
    // =========================================================================
    /// Sync engine command failed
    SyncFailed,
    /// Container runtime command failed
    ContainerFailed,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// Every code, in catalog order.
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigEnvError,
            Self::ConfigProjectNotFound,
            Self::ConfigRemoteMissing,
            Self::ConfigInvalidProject,
            Self::ConfigWriteError,
            Self::RemoteConnectionFailed,
            Self::RemoteCommandFailed,
            Self::RemoteInvalidPath,
            Self::LockHeld,
            Self::OwnershipDenied,
            Self::SessionConflict,
            Self::PromptUnavailable,
            Self::OperationAborted,
            Self::StateReadFailed,
            Self::StateWriteFailed,
            Self::StateEncodeFailed,
            Self::SyncFailed,
            Self::ContainerFailed,
            Self::InternalError,
        ]
    }

    /// Returns the numeric part of the code.
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigEnvError => 4,
            Self::ConfigProjectNotFound => 5,
            Self::ConfigRemoteMissing => 6,
            Self::ConfigInvalidProject => 7,
            Self::ConfigWriteError => 8,

            Self::RemoteConnectionFailed => 100,
            Self::RemoteCommandFailed => 101,
            Self::RemoteInvalidPath => 102,

            Self::LockHeld => 200,
            Self::OwnershipDenied => 201,
            Self::SessionConflict => 202,
            Self::PromptUnavailable => 203,
            Self::OperationAborted => 204,

            Self::StateReadFailed => 300,
            Self::StateWriteFailed => 301,
            Self::StateEncodeFailed => 302,

            Self::SyncFailed => 400,
            Self::ContainerFailed => 401,

            Self::InternalError => 500,
        }
    }

    /// Returns the formatted code string (e.g., "TDM-E200").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("TDM-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Remote,
            200..=299 => ErrorCategory::Coordination,
            300..=399 => ErrorCategory::State,
            400..=499 => ErrorCategory::Engine,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the complete catalog entry.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message template.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigEnvError => "Environment variable has invalid value",
            Self::ConfigProjectNotFound => "Project is not configured",
            Self::ConfigRemoteMissing => "No remote host configured",
            Self::ConfigInvalidProject => "Project name or path is invalid",
            Self::ConfigWriteError => "Failed to write configuration file",

            Self::RemoteConnectionFailed => "Could not reach the remote host",
            Self::RemoteCommandFailed => "Remote command failed",
            Self::RemoteInvalidPath => "Remote path cannot be used safely",

            Self::LockHeld => "Project is locked by another machine",
            Self::OwnershipDenied => "Remote project belongs to another account",
            Self::SessionConflict => "Another machine has an active session",
            Self::PromptUnavailable => "Confirmation required in non-interactive mode",
            Self::OperationAborted => "Operation aborted",

            Self::StateReadFailed => "Failed to read the project state document",
            Self::StateWriteFailed => "Failed to write the project state document",
            Self::StateEncodeFailed => "Failed to encode a state record",

            Self::SyncFailed => "File sync engine reported a failure",
            Self::ContainerFailed => "Container runtime reported a failure",

            Self::InternalError => "Internal error",
        }
    }

    /// Returns remediation steps for the error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Create ~/.config/tandem/config.toml",
                "Pass --config to point at a custom file",
            ],
            Self::ConfigReadError => &["Check file permissions on the configuration file"],
            Self::ConfigParseError => &["Validate the TOML syntax of the configuration file"],
            Self::ConfigEnvError => &["Unset or correct the TANDEM_* variable named above"],
            Self::ConfigProjectNotFound => &[
                "Add a [projects.<name>] section with a path",
                "Run 'tandem push <path>' to register a project",
            ],
            Self::ConfigRemoteMissing => &[
                "Set [remote].host in the configuration file",
                "Or export TANDEM_REMOTE_HOST",
            ],
            Self::ConfigInvalidProject => &[
                "Project names may contain letters, digits, '.', '-' and '_'",
            ],
            Self::ConfigWriteError => &["Check that the configuration directory is writable"],
            Self::RemoteConnectionFailed => &[
                "Check that 'ssh <host>' works without a password prompt",
                "Verify [remote].identity_file",
            ],
            Self::RemoteCommandFailed => &["Check permissions under [remote].base_path"],
            Self::RemoteInvalidPath => &[
                "Remove control characters from the configured paths",
                "Use project names made of letters, digits, '.', '-' and '_'",
            ],
            Self::LockHeld => &[
                "Run 'tandem stop <project>' on the machine holding the lock",
                "Or re-run with --takeover to force it",
            ],
            Self::OwnershipDenied => &["Ask the owner to push or remove the project"],
            Self::SessionConflict => &[
                "Exit the shell on the other machine",
                "Or re-run with --force",
            ],
            Self::PromptUnavailable => &[
                "Run interactively, or pass the flag that pre-approves the action",
            ],
            Self::OperationAborted => &[],
            Self::StateReadFailed | Self::StateWriteFailed => {
                &["Check permissions on <project>/.state/"]
            }
            Self::StateEncodeFailed => &[],
            Self::SyncFailed => &[
                "Run 'mutagen sync list' to inspect sync sessions",
                "Check that the mutagen daemon is running",
            ],
            Self::ContainerFailed => &["Check 'docker ps -a' on the remote host"],
            Self::InternalError => &["Re-run with --verbose and report the log"],
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration and project resolution (E001-E099)
    Config,
    /// Remote command execution (E100-E199)
    Remote,
    /// Lock, ownership and session conflicts (E200-E299)
    Coordination,
    /// Local state document storage (E300-E399)
    State,
    /// Sync engine and container runtime (E400-E499)
    Engine,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Remote => "Remote",
            Self::Coordination => "Coordination",
            Self::State => "State",
            Self::Engine => "Engine",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "TDM-E200")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error with remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
