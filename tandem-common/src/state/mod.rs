//! Per-project state document.
//!
//! One JSON file per project holds two independent sections:
//!
//! ```json
//! { "ownership": { "owner": "...", "created": "...", "machine": "..." },
//!   "session":   { "machine": "...", "user": "...", "timestamp": "...",
//!                  "pid": 1, "expires": "...", "hash": "..." } }
//! ```
//!
//! Sections are written with read-merge-write so updating one never drops
//! the other, and the file disappears once both are gone. The same layout
//! lives at `<project>/.state/state.lock` locally and under the remote
//! project path; the sync engine carries changes between the two.

mod ownership;
mod session;

pub use ownership::{
    OwnershipRecord, OwnershipStore, WriteAuthorization, create_ownership_info, is_owner,
};
pub use session::{DEFAULT_SESSION_TTL, SessionKey, SessionReadout, SessionRecord, SessionTracker};

use crate::error::StateError;
use crate::readout::Readout;
use crate::shell::join_remote;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory under the project root holding the state document.
pub const STATE_DIR: &str = ".state";
/// File name of the state document.
pub const STATE_FILE: &str = "state.lock";

/// Remote location of a project's state document.
pub fn remote_state_path(remote_project_path: &str) -> String {
    join_remote(&join_remote(remote_project_path, STATE_DIR), STATE_FILE)
}

/// Which half of the document a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Ownership,
    Session,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Self::Ownership => "ownership",
            Self::Session => "session",
        }
    }
}

/// A record type stored in one section of the document.
pub trait StateSection: Serialize + DeserializeOwned {
    const SECTION: Section;
}

/// The whole document. Sections are kept as raw JSON so a damaged session
/// never makes the ownership section unreadable, and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
}

impl StateDocument {
    pub fn parse(raw: Option<&str>) -> Readout<Self> {
        Readout::from_json(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.ownership.is_none() && self.session.is_none()
    }

    fn slot(&self, section: Section) -> Option<&Value> {
        match section {
            Section::Ownership => self.ownership.as_ref(),
            Section::Session => self.session.as_ref(),
        }
    }

    fn slot_mut(&mut self, section: Section) -> &mut Option<Value> {
        match section {
            Section::Ownership => &mut self.ownership,
            Section::Session => &mut self.session,
        }
    }

    /// Decode one section.
    pub fn section<S: StateSection>(&self) -> Readout<S> {
        match self.slot(S::SECTION) {
            None | Some(Value::Null) => Readout::Absent,
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(record) => Readout::Valid(record),
                Err(e) => Readout::Corrupt(format!("{} section: {e}", S::SECTION.key())),
            },
        }
    }

    pub fn set_section<S: StateSection>(&mut self, record: &S) -> Result<(), StateError> {
        *self.slot_mut(S::SECTION) = Some(serde_json::to_value(record)?);
        Ok(())
    }

    pub fn clear_section<S: StateSection>(&mut self) {
        *self.slot_mut(S::SECTION) = None;
    }

    pub fn to_json(&self) -> Result<String, StateError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Start a read-merge-write from whatever is on disk.
///
/// A damaged document is replaced rather than blocking the write.
pub(crate) fn document_for_update(readout: Readout<StateDocument>, origin: &str) -> StateDocument {
    match readout {
        Readout::Valid(doc) => doc,
        Readout::Absent => StateDocument::default(),
        Readout::Corrupt(reason) => {
            warn!(origin, reason = %reason, "state document is unreadable; rewriting from scratch");
            StateDocument::default()
        }
    }
}

/// The state document on the local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    /// `<project_root>/.state/state.lock`
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            path: project_root.join(STATE_DIR).join(STATE_FILE),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_document(&self) -> Result<Readout<StateDocument>, StateError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(StateDocument::parse(Some(&raw))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Readout::Absent),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn read_section<S: StateSection>(&self) -> Result<Readout<S>, StateError> {
        Ok(match self.read_document()? {
            Readout::Valid(doc) => doc.section(),
            Readout::Absent => Readout::Absent,
            Readout::Corrupt(reason) => Readout::Corrupt(reason),
        })
    }

    /// Replace one section, keeping the other.
    pub fn write_section<S: StateSection>(&self, record: &S) -> Result<(), StateError> {
        let mut doc = self.document_for_update()?;
        doc.set_section(record)?;
        self.store(&doc)?;
        debug!(path = %self.path.display(), section = S::SECTION.key(), "wrote state section");
        Ok(())
    }

    /// Drop one section; deletes the file when nothing is left.
    pub fn remove_section<S: StateSection>(&self) -> Result<(), StateError> {
        let mut doc = match self.read_document()? {
            Readout::Absent => return Ok(()),
            other => document_for_update(other, &self.path.display().to_string()),
        };
        doc.clear_section::<S>();
        self.store(&doc)?;
        debug!(path = %self.path.display(), section = S::SECTION.key(), "removed state section");
        Ok(())
    }

    /// Mark the document read-only to discourage hand edits.
    ///
    /// Tandem's own writes replace the file by rename and are unaffected.
    pub fn mark_read_only(&self) -> Result<(), StateError> {
        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };
        let mut perms = fs::metadata(&self.path).map_err(write_err)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&self.path, perms).map_err(write_err)
    }

    fn document_for_update(&self) -> Result<StateDocument, StateError> {
        Ok(document_for_update(
            self.read_document()?,
            &self.path.display().to_string(),
        ))
    }

    fn store(&self, doc: &StateDocument) -> Result<(), StateError> {
        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };

        if doc.is_empty() {
            clear_read_only(&self.path);
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(write_err(e)),
            };
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(write_err)?;

        let json = doc.to_json()?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        clear_read_only(&self.path);
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Renaming over (or deleting) a read-only file works on Unix, where only
/// the directory permissions matter. Windows refuses, so drop the bit first.
#[cfg(windows)]
#[allow(clippy::permissions_set_readonly_false)]
fn clear_read_only(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        let mut perms = meta.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = fs::set_permissions(path, perms);
        }
    }
}

#[cfg(not(windows))]
fn clear_read_only(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn ownership(owner: &str) -> OwnershipRecord {
        OwnershipRecord {
            owner: owner.to_string(),
            created: Utc::now(),
            machine: "laptop".to_string(),
        }
    }

    #[test]
    fn test_remote_state_path() {
        assert_eq!(
            remote_state_path("~/tandem/demo"),
            "~/tandem/demo/.state/state.lock"
        );
    }

    #[test]
    fn test_missing_document_reads_absent() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::for_project(dir.path());
        assert!(store.read_document().unwrap().is_absent());
        assert!(store.read_section::<OwnershipRecord>().unwrap().is_absent());
    }

    #[test]
    fn test_write_then_read_section() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::for_project(dir.path());
        let record = ownership("alice");

        store.write_section(&record).unwrap();
        assert_eq!(
            store.read_section::<OwnershipRecord>().unwrap(),
            Readout::Valid(record)
        );
        assert!(store.path().ends_with(".state/state.lock"));
    }

    #[test]
    fn test_removing_last_section_deletes_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::for_project(dir.path());
        store.write_section(&ownership("alice")).unwrap();
        assert!(store.path().exists());

        store.remove_section::<OwnershipRecord>().unwrap();
        assert!(!store.path().exists());
        // Removing again is a no-op.
        store.remove_section::<OwnershipRecord>().unwrap();
    }

    #[test]
    fn test_corrupt_document_is_replaced_on_write() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::for_project(dir.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{{{ not json").unwrap();

        assert!(store.read_section::<OwnershipRecord>().unwrap().is_corrupt());
        store.write_section(&ownership("alice")).unwrap();
        assert!(matches!(
            store.read_section::<OwnershipRecord>().unwrap(),
            Readout::Valid(_)
        ));
    }

    #[test]
    fn test_damaged_section_does_not_hide_sibling() {
        let doc: StateDocument = serde_json::from_str(
            r#"{"ownership":{"owner":"alice","created":"2026-01-02T03:04:05Z","machine":"laptop"},
                "session":{"machine":"laptop"}}"#,
        )
        .unwrap();
        assert!(matches!(doc.section::<OwnershipRecord>(), Readout::Valid(_)));
        assert!(doc.section::<SessionRecord>().is_corrupt());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_succeeds_over_read_only_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::for_project(dir.path());
        store.write_section(&ownership("alice")).unwrap();
        store.mark_read_only().unwrap();
        assert!(fs::metadata(store.path()).unwrap().permissions().readonly());

        store.write_section(&ownership("bob")).unwrap();
        let read = store.read_section::<OwnershipRecord>().unwrap().valid().unwrap();
        assert_eq!(read.owner, "bob");
    }
}
