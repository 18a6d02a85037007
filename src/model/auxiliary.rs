//! Auxiliary shareable objects and their ownership records

use super::access::CollaboratorAccess;
use super::principal::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AclError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuxKind {
    BackupLocation,
    SchedulePolicy,
    Rule,
    CloudCredential,
}

impl AuxKind {
    pub const ALL: [AuxKind; 4] = [
        AuxKind::BackupLocation,
        AuxKind::SchedulePolicy,
        AuxKind::Rule,
        AuxKind::CloudCredential,
    ];

    /// Name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            AuxKind::BackupLocation => "backup location",
            AuxKind::SchedulePolicy => "schedule policy",
            AuxKind::Rule => "rule",
            AuxKind::CloudCredential => "cloud credential",
        }
    }
}

impl fmt::Display for AuxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for AuxKind {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['_', ' '], "-").as_str() {
            "backup-location" | "location" => Ok(AuxKind::BackupLocation),
            "schedule-policy" | "policy" => Ok(AuxKind::SchedulePolicy),
            "rule" => Ok(AuxKind::Rule),
            "cloud-credential" | "credential" => Ok(AuxKind::CloudCredential),
            _ => Err(AclError::InvalidArgument(format!(
                "unknown object kind '{}'",
                s
            ))),
        }
    }
}

/// Owner plus collaborator map for one auxiliary object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub owner: PrincipalId,
    /// Users and groups with explicit access; `Invalid` entries are never stored
    pub collaborators: BTreeMap<PrincipalId, CollaboratorAccess>,
    /// Access held by everyone not listed in `collaborators`
    pub public_access: CollaboratorAccess,
}

impl OwnershipRecord {
    pub fn owned_by(owner: PrincipalId) -> Self {
        OwnershipRecord {
            owner,
            collaborators: BTreeMap::new(),
            public_access: CollaboratorAccess::Invalid,
        }
    }

    /// Set or clear one collaborator entry
    pub fn set_collaborator(&mut self, principal: PrincipalId, access: CollaboratorAccess) {
        if access == CollaboratorAccess::Invalid {
            self.collaborators.remove(&principal);
        } else {
            self.collaborators.insert(principal, access);
        }
    }

    /// Access of `principal` given the groups it belongs to.
    /// Owner always gets `Write`; otherwise the best of the explicit entries,
    /// falling back to public access when none is listed.
    pub fn access_of<'a>(
        &self,
        principal: &'a PrincipalId,
        groups: impl IntoIterator<Item = &'a PrincipalId>,
    ) -> CollaboratorAccess {
        if &self.owner == principal {
            return CollaboratorAccess::Write;
        }

        let mut listed = false;
        let mut best = CollaboratorAccess::Invalid;
        for id in std::iter::once(principal).chain(groups) {
            if let Some(access) = self.collaborators.get(id) {
                listed = true;
                best = best.max(*access);
            }
        }

        if listed {
            best
        } else {
            self.public_access
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxiliaryObject {
    pub kind: AuxKind,
    pub name: String,
    pub uid: String,
    pub ownership: OwnershipRecord,
    pub created_at: DateTime<Utc>,
}

/// Collaborator update applied by `update_ownership`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipUpdate {
    pub users: Vec<String>,
    pub groups: Vec<String>,
    /// Applied to every listed user and group; `Invalid` clears their entries
    pub access: CollaboratorAccess,
    /// Public access for principals not listed anywhere; `Invalid` means none
    pub inverse_access: CollaboratorAccess,
}

impl OwnershipUpdate {
    pub fn new(access: CollaboratorAccess) -> Self {
        OwnershipUpdate {
            access,
            ..Default::default()
        }
    }

    pub fn users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn public(mut self, access: CollaboratorAccess) -> Self {
        self.inverse_access = access;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_always_writes() {
        let owner = PrincipalId::new("owner");
        let record = OwnershipRecord::owned_by(owner.clone());
        assert_eq!(record.access_of(&owner, []), CollaboratorAccess::Write);
        assert_eq!(
            record.access_of(&PrincipalId::new("other"), []),
            CollaboratorAccess::Invalid
        );
    }

    #[test]
    fn test_group_entry_and_public_fallback() {
        let mut record = OwnershipRecord::owned_by(PrincipalId::new("owner"));
        let group = PrincipalId::new("g-1");
        record.set_collaborator(group.clone(), CollaboratorAccess::Write);
        record.public_access = CollaboratorAccess::Read;

        let member = PrincipalId::new("u-1");
        assert_eq!(record.access_of(&member, [&group]), CollaboratorAccess::Write);
        assert_eq!(record.access_of(&member, []), CollaboratorAccess::Read);
    }

    #[test]
    fn test_invalid_clears_entry() {
        let mut record = OwnershipRecord::owned_by(PrincipalId::new("owner"));
        let user = PrincipalId::new("u-1");
        record.set_collaborator(user.clone(), CollaboratorAccess::Read);
        record.set_collaborator(user.clone(), CollaboratorAccess::Invalid);
        assert!(record.collaborators.is_empty());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("backup-location".parse::<AuxKind>().unwrap(), AuxKind::BackupLocation);
        assert_eq!("schedule_policy".parse::<AuxKind>().unwrap(), AuxKind::SchedulePolicy);
        assert!("bucket".parse::<AuxKind>().is_err());
        assert_eq!(AuxKind::BackupLocation.to_string(), "backup location");
    }
}
