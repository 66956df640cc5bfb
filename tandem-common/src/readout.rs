//! Tri-state result of reading a record that may be missing or damaged.

use serde::de::DeserializeOwned;

/// Outcome of reading a JSON record from disk or from the remote host.
///
/// Coordination decisions fail open: both `Absent` and `Corrupt` are treated
/// as "no record". Keeping them apart lets `status` and the tests tell a
/// record that never existed from one that was damaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readout<T> {
    Valid(T),
    Absent,
    /// Present but unusable; carries the parse failure.
    Corrupt(String),
}

impl<T> Readout<T> {
    /// Parse a JSON payload. `None` means the file does not exist.
    pub fn from_json(raw: Option<&str>) -> Self
    where
        T: DeserializeOwned,
    {
        let Some(raw) = raw else {
            return Self::Absent;
        };
        if raw.trim().is_empty() {
            return Self::Corrupt("empty record".to_string());
        }
        match serde_json::from_str(raw) {
            Ok(value) => Self::Valid(value),
            Err(e) => Self::Corrupt(e.to_string()),
        }
    }

    /// The record, if valid. Collapses `Absent` and `Corrupt`.
    pub fn valid(self) -> Option<T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Absent | Self::Corrupt(_) => None,
        }
    }

    pub fn as_valid(&self) -> Option<&T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Absent | Self::Corrupt(_) => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Readout<U> {
        match self {
            Self::Valid(value) => Readout::Valid(f(value)),
            Self::Absent => Readout::Absent,
            Self::Corrupt(reason) => Readout::Corrupt(reason),
        }
    }
}
