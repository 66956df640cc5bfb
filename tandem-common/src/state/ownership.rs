//! Ownership of the remote copy of a project.
//!
//! The first account to push a project is recorded as its owner. Later
//! pushes and remote deletes are allowed only for that account name. A
//! project without a record (including one pushed before ownership existed)
//! is open to anyone.
//!
//! Identity here is the OS account name, not the SSH key: two people
//! sharing an account name are the same owner.

use super::{StateDocument, StateSection, Section, document_for_update, remote_state_path};
use crate::error::StateError;
use crate::identity::Identity;
use crate::readout::Readout;
use crate::remote::{RemoteExecutor, RemoteFs, RemoteHost};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Account name of the first successful pusher.
    pub owner: String,
    pub created: DateTime<Utc>,
    /// Machine the first push came from.
    pub machine: String,
}

impl StateSection for OwnershipRecord {
    const SECTION: Section = Section::Ownership;
}

/// Capture the local identity as an ownership claim.
pub fn create_ownership_info(identity: &Identity) -> OwnershipRecord {
    OwnershipRecord {
        owner: identity.user.clone(),
        created: Utc::now(),
        machine: identity.machine.clone(),
    }
}

pub fn is_owner(record: &OwnershipRecord, identity: &Identity) -> bool {
    record.owner == identity.user
}

/// Result of [`OwnershipStore::check_write_authorization`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAuthorization {
    /// Writing is allowed. `owner` is `None` when the project is unclaimed.
    Authorized { owner: Option<OwnershipRecord> },
    /// Someone else owns the remote copy.
    Denied { owner: OwnershipRecord },
}

impl WriteAuthorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }

    /// True when nobody has claimed the project yet.
    pub fn is_unclaimed(&self) -> bool {
        matches!(self, Self::Authorized { owner: None })
    }
}

/// Reads and writes the ownership section of the remote state document.
///
/// Goes straight to the remote host, so it works before any sync session
/// exists and is not affected by sync lag on this machine.
#[derive(Clone)]
pub struct OwnershipStore {
    fs: RemoteFs,
    identity: Identity,
}

impl OwnershipStore {
    pub fn new(executor: Arc<dyn RemoteExecutor>, host: RemoteHost, identity: Identity) -> Self {
        Self {
            fs: RemoteFs::new(executor, host),
            identity,
        }
    }

    async fn read_document(
        &self,
        remote_project_path: &str,
    ) -> Result<Readout<StateDocument>, StateError> {
        Ok(self
            .fs
            .read_file(&remote_state_path(remote_project_path))
            .await?
            .into_readout(StateDocument::parse))
    }

    pub async fn get_ownership_status(
        &self,
        remote_project_path: &str,
    ) -> Result<Readout<OwnershipRecord>, StateError> {
        Ok(match self.read_document(remote_project_path).await? {
            Readout::Valid(doc) => doc.section(),
            Readout::Absent => Readout::Absent,
            Readout::Corrupt(reason) => Readout::Corrupt(reason),
        })
    }

    /// Record this identity as owner, preserving any session section.
    pub async fn set_ownership(
        &self,
        remote_project_path: &str,
    ) -> Result<OwnershipRecord, StateError> {
        let path = remote_state_path(remote_project_path);
        let mut doc = document_for_update(self.read_document(remote_project_path).await?, &path);
        let record = create_ownership_info(&self.identity);
        doc.set_section(&record)?;
        self.fs.write_file(&path, &doc.to_json()?).await?;
        info!(
            path = %path,
            owner = %record.owner,
            machine = %record.machine,
            "ownership recorded"
        );
        Ok(record)
    }

    /// May this identity mutate the remote copy?
    ///
    /// Unclaimed or unreadable records authorize everyone. Transport
    /// failures are errors, never an implicit yes.
    pub async fn check_write_authorization(
        &self,
        remote_project_path: &str,
    ) -> Result<WriteAuthorization, StateError> {
        Ok(match self.get_ownership_status(remote_project_path).await? {
            Readout::Valid(owner) if is_owner(&owner, &self.identity) => {
                WriteAuthorization::Authorized { owner: Some(owner) }
            }
            Readout::Valid(owner) => {
                info!(
                    path = remote_project_path,
                    owner = %owner.owner,
                    user = %self.identity.user,
                    "write denied by ownership record"
                );
                WriteAuthorization::Denied { owner }
            }
            Readout::Absent => WriteAuthorization::Authorized { owner: None },
            Readout::Corrupt(reason) => {
                warn!(
                    path = remote_project_path,
                    reason = %reason,
                    "ownership record is unreadable; allowing write"
                );
                WriteAuthorization::Authorized { owner: None }
            }
        })
    }
}
