//! Error types shared by the coordination layer.
//!
//! Conflicts are ordinary outcomes: `acquire()` returns `AcquireOutcome::Held`
//! and `check_write_authorization()` returns `WriteAuthorization::Denied`.
//! They only become [`ProtocolError`] values once a command decides the
//! conflict is fatal.

use crate::errors::ErrorCode;
use crate::lock::LockRecord;
use crate::state::{OwnershipRecord, SessionRecord};
use std::path::PathBuf;
use thiserror::Error;

/// Failure of the remote execution primitive itself.
///
/// Never retried by this crate; callers surface it and let the operator decide.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The host could not be reached (network, auth, multiplexer).
    #[error("failed to reach {host}: {message}")]
    Connection { host: String, message: String },

    /// The command ran and exited unsuccessfully (permissions, missing tools).
    #[error("remote command failed on {host}: {message}")]
    Command { host: String, message: String },

    /// A path that cannot be used safely on the remote shell.
    #[error("unsafe remote path {0:?}")]
    InvalidPath(String),

    /// A record could not be encoded for transfer.
    #[error("failed to encode remote payload: {0}")]
    Payload(String),
}

impl RemoteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::RemoteConnectionFailed,
            Self::Command { .. } => ErrorCode::RemoteCommandFailed,
            Self::InvalidPath(_) => ErrorCode::RemoteInvalidPath,
            Self::Payload(_) => ErrorCode::InternalError,
        }
    }
}

/// Failure reading or writing a state document.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl StateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::StateReadFailed,
            Self::Write { .. } => ErrorCode::StateWriteFailed,
            Self::Encode(_) => ErrorCode::StateEncodeFailed,
            Self::Remote(err) => err.code(),
        }
    }
}

/// Failure reported by the sync engine or container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("sync engine: {0}")]
    Sync(String),

    #[error("container runtime: {0}")]
    Container(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Sync(_) => ErrorCode::SyncFailed,
            Self::Container(_) => ErrorCode::ContainerFailed,
        }
    }
}

/// Fatal outcome of a lifecycle command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(
        "project '{project}' is locked by {}@{} since {} (pid {})",
        holder.user,
        holder.machine,
        holder.timestamp.to_rfc3339(),
        holder.pid
    )]
    LockHeld { project: String, holder: LockRecord },

    #[error(
        "remote copy of '{project}' is owned by {} (claimed from {} at {})",
        owner.owner,
        owner.machine,
        owner.created.to_rfc3339()
    )]
    OwnershipDenied {
        project: String,
        owner: OwnershipRecord,
    },

    #[error(
        "{}@{} has an active session on '{project}' until {}",
        session.user,
        session.machine,
        session.expires.to_rfc3339()
    )]
    SessionConflict {
        project: String,
        session: SessionRecord,
    },

    #[error("confirmation required but running non-interactively: {0}")]
    PromptUnavailable(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LockHeld { .. } => ErrorCode::LockHeld,
            Self::OwnershipDenied { .. } => ErrorCode::OwnershipDenied,
            Self::SessionConflict { .. } => ErrorCode::SessionConflict,
            Self::PromptUnavailable(_) => ErrorCode::PromptUnavailable,
            Self::Aborted(_) => ErrorCode::OperationAborted,
            Self::Remote(err) => err.code(),
            Self::State(err) => err.code(),
            Self::Engine(err) => err.code(),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LockHeld { .. } | Self::SessionConflict { .. } => 2,
            Self::OwnershipDenied { .. } => 3,
            Self::Aborted(_) | Self::PromptUnavailable(_) => 4,
            Self::Remote(_) | Self::State(_) | Self::Engine(_) => 1,
        }
    }
}
