//! Coordination layer for Tandem.
//!
//! Tandem mirrors a project between several machines and one shared remote
//! host. Machines never talk to each other; they only see the remote
//! filesystem through [`remote::RemoteExecutor`]. This crate provides the
//! three records that keep them from stepping on each other:
//!
//! - [`lock::RemoteLock`]: advisory single-writer lock guarding `start`.
//! - [`state::OwnershipStore`]: who first pushed the remote copy, gating
//!   `push` and `remove --remote`.
//! - [`state::SessionTracker`]: HMAC-stamped record of the machine holding
//!   an interactive shell.
//!
//! [`protocol`] composes them into the lifecycle commands.

pub mod config;
pub mod error;
pub mod errors;
pub mod identity;
pub mod lock;
pub mod logging;
pub mod protocol;
pub mod readout;
pub mod remote;
pub mod shell;
pub mod state;

pub use config::{ConfigError, ProjectSpec, ResolvedProject, TandemConfig};
pub use error::{EngineError, ProtocolError, RemoteError, StateError};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use identity::Identity;
pub use lock::{AcquireOutcome, LockRecord, LockStatus, RemoteLock};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use protocol::{
    ContainerRuntime, ContainerState, Coordinator, NonInteractive, Prompter, SyncEngine, SyncState,
    Transfer,
};
pub use readout::Readout;
pub use remote::{ExecOutput, LocalExecutor, MockExecutor, RemoteExecutor, RemoteHost};
pub use state::{
    LocalStateStore, OwnershipRecord, OwnershipStore, SessionKey, SessionReadout, SessionRecord,
    SessionTracker, StateDocument, WriteAuthorization,
};

#[cfg(unix)]
pub use remote::SshExecutor;
