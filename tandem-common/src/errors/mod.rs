//! Error catalog for Tandem.
//!
//! Every user-facing failure maps to a stable code so that scripted callers
//! (and `--json` output) can branch on it without parsing messages.
//!
//! # Error Code Ranges
//!
//! | Range      | Category     | Description                             |
//! |------------|--------------|-----------------------------------------|
//! | E001-E099  | Config       | Configuration and project resolution    |
//! | E100-E199  | Remote       | Remote command execution (transport)    |
//! | E200-E299  | Coordination | Lock, ownership and session conflicts   |
//! | E300-E399  | State        | Local state document storage            |
//! | E400-E499  | Engine       | Sync engine and container runtime       |
//! | E500-E599  | Internal     | Internal/unexpected errors              |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
