//! Local interactive session record.
//!
//! A session says "this machine is working in the project right now". It
//! lives only in the local state document and reaches other machines
//! through the sync engine. The HMAC catches accidental edits and partial
//! writes; the key ships with the binary, so it is not a security boundary.

use super::{LocalStateStore, Section, StateSection};
use crate::error::StateError;
use crate::identity::Identity;
use crate::readout::Readout;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// How long a session stays valid after it is stamped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

const APP_KEY: &[u8] = b"tandem/session-record/v1";

/// Key used to sign session records.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    fn mac(&self, message: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        mac
    }

    /// Hex-encoded HMAC-SHA256 of `message`.
    pub fn sign(&self, message: &str) -> String {
        hex::encode(self.mac(message).finalize().into_bytes())
    }

    /// Constant-time comparison against a hex signature.
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        match hex::decode(signature) {
            Ok(bytes) => self.mac(message).verify_slice(&bytes).is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new(APP_KEY)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub machine: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub expires: DateTime<Utc>,
    /// Hex HMAC-SHA256 over [`SessionRecord::canonical`].
    pub hash: String,
}

impl StateSection for SessionRecord {
    const SECTION: Section = Section::Session;
}

impl SessionRecord {
    /// Build and sign a record for `identity` starting at `now`.
    pub fn stamp(identity: &Identity, now: DateTime<Utc>, ttl: TimeDelta, key: &SessionKey) -> Self {
        let mut record = Self {
            machine: identity.machine.clone(),
            user: identity.user.clone(),
            timestamp: now,
            pid: identity.pid,
            expires: now + ttl,
            hash: String::new(),
        };
        record.hash = key.sign(&record.canonical());
        record
    }

    /// `machine|user|timestamp|pid|expires`, timestamps in RFC 3339.
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.machine,
            self.user,
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.pid,
            self.expires.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
    }

    pub fn verify(&self, key: &SessionKey) -> bool {
        key.verify(&self.canonical(), &self.hash)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// `user@machine`
    pub fn holder(&self) -> String {
        format!("{}@{}", self.user, self.machine)
    }
}

/// Outcome of validating the session section.
///
/// Only `Valid` counts as a live session; everything else means "none".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReadout {
    Valid(SessionRecord),
    Absent,
    /// Missing fields, bad JSON or a hash mismatch.
    Corrupt(String),
    Expired(SessionRecord),
}

impl SessionReadout {
    pub fn valid(self) -> Option<SessionRecord> {
        match self {
            Self::Valid(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    fn classify(readout: Readout<SessionRecord>, key: &SessionKey, now: DateTime<Utc>) -> Self {
        match readout {
            Readout::Absent => Self::Absent,
            Readout::Corrupt(reason) => Self::Corrupt(reason),
            Readout::Valid(record) if !record.verify(key) => {
                Self::Corrupt("session hash does not match".to_string())
            }
            Readout::Valid(record) if record.is_expired_at(now) => Self::Expired(record),
            Readout::Valid(record) => Self::Valid(record),
        }
    }
}

/// Stamps and validates the session section of a project's local state.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    store: LocalStateStore,
    identity: Identity,
    key: SessionKey,
    ttl: TimeDelta,
}

impl SessionTracker {
    pub fn new(store: LocalStateStore, identity: Identity, key: SessionKey) -> Self {
        Self {
            store,
            identity,
            key,
            ttl: ttl_delta(DEFAULT_SESSION_TTL),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl_delta(ttl);
        self
    }

    pub fn store(&self) -> &LocalStateStore {
        &self.store
    }

    pub fn write_session(&self) -> Result<SessionRecord, StateError> {
        self.write_session_at(Utc::now())
    }

    /// Sign and persist a session for this machine, then mark the file
    /// read-only. Ownership already in the document is kept.
    pub fn write_session_at(&self, now: DateTime<Utc>) -> Result<SessionRecord, StateError> {
        let record = SessionRecord::stamp(&self.identity, now, self.ttl, &self.key);
        self.store.write_section(&record)?;
        if let Err(e) = self.store.mark_read_only() {
            warn!(path = %self.store.path().display(), error = %e, "could not mark state read-only");
        }
        info!(
            machine = %record.machine,
            user = %record.user,
            expires = %record.expires,
            "session stamped"
        );
        Ok(record)
    }

    pub fn read_session(&self) -> Result<SessionReadout, StateError> {
        self.read_session_at(Utc::now())
    }

    pub fn read_session_at(&self, now: DateTime<Utc>) -> Result<SessionReadout, StateError> {
        let readout = SessionReadout::classify(self.store.read_section()?, &self.key, now);
        match &readout {
            SessionReadout::Corrupt(reason) => {
                warn!(path = %self.store.path().display(), reason = %reason, "ignoring damaged session");
            }
            SessionReadout::Expired(record) => {
                debug!(holder = %record.holder(), expired = %record.expires, "session expired");
            }
            SessionReadout::Valid(_) | SessionReadout::Absent => {}
        }
        Ok(readout)
    }

    /// The live session, if any.
    pub fn read_session_record(&self) -> Result<Option<SessionRecord>, StateError> {
        Ok(self.read_session()?.valid())
    }

    pub fn check_session_conflict(&self) -> Result<Option<SessionRecord>, StateError> {
        self.check_session_conflict_at(Utc::now())
    }

    /// A valid session belonging to a different machine.
    pub fn check_session_conflict_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StateError> {
        Ok(self
            .read_session_at(now)?
            .valid()
            .filter(|record| record.machine != self.identity.machine))
    }

    /// Remove this machine's session. A live session from another machine
    /// is left alone. Returns whether anything was removed.
    pub fn clear_session(&self) -> Result<bool, StateError> {
        match self.read_session()? {
            SessionReadout::Absent => Ok(false),
            SessionReadout::Valid(record) if record.machine != self.identity.machine => {
                info!(holder = %record.holder(), "leaving another machine's session in place");
                Ok(false)
            }
            _ => {
                self.store.remove_section::<SessionRecord>()?;
                debug!(path = %self.store.path().display(), "session cleared");
                Ok(true)
            }
        }
    }
}

fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OwnershipRecord;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir, machine: &str) -> SessionTracker {
        SessionTracker::new(
            LocalStateStore::for_project(dir.path()),
            Identity::new(machine, "alice").with_pid(77),
            SessionKey::default(),
        )
    }

    fn rewrite_session(store: &LocalStateStore, edit: impl FnOnce(&mut serde_json::Value)) {
        let raw = fs::read_to_string(store.path()).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        edit(&mut doc["session"]);
        let mut perms = fs::metadata(store.path()).unwrap().permissions();
        perms.set_readonly(false);
        fs::set_permissions(store.path(), perms).unwrap();
        fs::write(store.path(), serde_json::to_string(&doc).unwrap()).unwrap();
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SessionKey::new(b"hunter2".to_vec());
        assert!(!format!("{key:?}").contains("hunter2"));
    }

    #[test]
    fn test_sign_is_deterministic_and_key_dependent() {
        let a = SessionKey::default();
        let b = SessionKey::new(b"other".to_vec());
        assert_eq!(a.sign("x"), a.sign("x"));
        assert_ne!(a.sign("x"), b.sign("x"));
        assert_eq!(a.sign("x").len(), 64);
        assert!(!a.verify("x", "not-hex"));
    }

    #[test]
    fn test_write_then_read_session() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir, "laptop");
        let written = t.write_session().unwrap();

        assert_eq!(t.read_session().unwrap(), SessionReadout::Valid(written.clone()));
        assert_eq!(written.expires - written.timestamp, TimeDelta::hours(8));
        assert!(fs::metadata(t.store().path()).unwrap().permissions().readonly());
    }

    #[test]
    fn test_expired_session_is_not_valid() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir, "laptop");
        let then = Utc::now() - TimeDelta::hours(9);
        t.write_session_at(then).unwrap();

        assert!(matches!(t.read_session().unwrap(), SessionReadout::Expired(_)));
        assert_eq!(t.read_session_record().unwrap(), None);
    }

    #[test]
    fn test_conflict_only_for_other_machine() {
        let dir = TempDir::new().unwrap();
        tracker(&dir, "laptop").write_session().unwrap();

        assert!(tracker(&dir, "laptop").check_session_conflict().unwrap().is_none());
        let conflict = tracker(&dir, "desktop").check_session_conflict().unwrap();
        assert_eq!(conflict.map(|s| s.machine), Some("laptop".to_string()));
    }

    #[test]
    fn test_no_conflict_for_expired_foreign_session() {
        let dir = TempDir::new().unwrap();
        let long_ago = Utc::now() - TimeDelta::days(2);
        tracker(&dir, "laptop").write_session_at(long_ago).unwrap();
        assert!(tracker(&dir, "desktop").check_session_conflict().unwrap().is_none());
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir, "laptop");
        t.write_session().unwrap();
        rewrite_session(t.store(), |s| {
            s.as_object_mut().unwrap().remove("hash");
        });
        assert!(matches!(t.read_session().unwrap(), SessionReadout::Corrupt(_)));
    }

    #[test]
    fn test_session_and_ownership_are_independent() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir, "laptop");
        let owner = OwnershipRecord {
            owner: "alice".into(),
            created: Utc::now(),
            machine: "laptop".into(),
        };
        t.store().write_section(&owner).unwrap();
        t.write_session().unwrap();
        assert_eq!(
            t.store().read_section::<OwnershipRecord>().unwrap(),
            Readout::Valid(owner.clone())
        );

        assert!(t.clear_session().unwrap());
        assert_eq!(
            t.store().read_section::<OwnershipRecord>().unwrap(),
            Readout::Valid(owner)
        );
        assert!(t.store().path().exists());
    }

    #[test]
    fn test_clear_leaves_foreign_session() {
        let dir = TempDir::new().unwrap();
        tracker(&dir, "laptop").write_session().unwrap();

        assert!(!tracker(&dir, "desktop").clear_session().unwrap());
        assert!(tracker(&dir, "laptop").read_session().unwrap().is_valid());

        assert!(tracker(&dir, "laptop").clear_session().unwrap());
        assert!(!dir.path().join(".state/state.lock").exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_any_field_edit_breaks_the_hash(field in 0usize..5, suffix in "[a-z0-9]{1,8}") {
            let dir = TempDir::new().unwrap();
            let t = tracker(&dir, "laptop");
            let record = t.write_session().unwrap();

            rewrite_session(t.store(), |s| match field {
                0 => s["machine"] = format!("{}{suffix}", record.machine).into(),
                1 => s["user"] = format!("{}{suffix}", record.user).into(),
                2 => s["timestamp"] = (record.timestamp - TimeDelta::seconds(1)).to_rfc3339().into(),
                3 => s["pid"] = (record.pid + 1).into(),
                _ => s["expires"] = (record.expires + TimeDelta::hours(1)).to_rfc3339().into(),
            });

            let readout = t.read_session().unwrap();
            prop_assert!(matches!(readout, SessionReadout::Corrupt(_)), "got {:?}", readout);
        }
    }
}
