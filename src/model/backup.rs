//! Backups, clusters and restores

use super::principal::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! uid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

uid_type!(
    /// Unique identifier of a backup object
    BackupUid
);
uid_type!(
    /// Unique identifier of a registered cluster object
    ClusterId
);

/// Backup lifecycle
///
/// ```text
/// Creating -> Active -> DeletePending -> Deleting -> Deleted
///               \-> CloudBackupMissing -> DeletePending
/// ```
///
/// Transitions are driven from outside (data movement and cloud sync); this
/// crate only validates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Creating,
    Active,
    DeletePending,
    Deleting,
    Deleted,
    CloudBackupMissing,
}

impl LifecycleState {
    /// Deletion has been requested but the object is still addressable.
    /// A lingering reference in this state is not a revocation failure.
    pub fn is_deleting(&self) -> bool {
        matches!(self, LifecycleState::DeletePending | LifecycleState::Deleting)
    }

    pub fn is_deleted(&self) -> bool {
        *self == LifecycleState::Deleted
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Creating, Active)
                | (Creating, DeletePending)
                | (Active, DeletePending)
                | (Active, CloudBackupMissing)
                | (CloudBackupMissing, DeletePending)
                | (DeletePending, Deleting)
                | (Deleting, Deleted)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A backup tracked by the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupObject {
    pub uid: BackupUid,
    pub name: String,
    pub owner: PrincipalId,
    pub cluster: ClusterId,
    pub org_id: String,
    pub location: Option<String>,
    /// Previous backup in an incremental chain. Informational only: access
    /// is always evaluated per backup uid.
    pub parent: Option<BackupUid>,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    /// Set when the owning principal was deleted
    pub orphaned: bool,
}

impl BackupObject {
    pub fn is_incremental(&self) -> bool {
        self.parent.is_some()
    }
}

/// Reference to a backup by name, optionally pinned to a uid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRef {
    pub name: String,
    pub uid: Option<BackupUid>,
}

impl BackupRef {
    pub fn named(name: impl Into<String>) -> Self {
        BackupRef {
            name: name.into(),
            uid: None,
        }
    }

    pub fn with_uid(name: impl Into<String>, uid: BackupUid) -> Self {
        BackupRef {
            name: name.into(),
            uid: Some(uid),
        }
    }
}

impl From<&str> for BackupRef {
    fn from(name: &str) -> Self {
        BackupRef::named(name)
    }
}

impl fmt::Display for BackupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Request to create a backup
#[derive(Debug, Clone)]
pub struct BackupSpec {
    pub name: String,
    /// Cluster name, resolved in the creating caller's scope
    pub cluster: String,
    pub location: Option<String>,
    pub schedule_policy: Option<String>,
    pub pre_rule: Option<String>,
    pub post_rule: Option<String>,
    /// Name of the previous backup when this one is incremental
    pub parent: Option<String>,
    pub initial_state: LifecycleState,
}

impl BackupSpec {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        BackupSpec {
            name: name.into(),
            cluster: cluster.into(),
            location: None,
            schedule_policy: None,
            pre_rule: None,
            post_rule: None,
            parent: None,
            initial_state: LifecycleState::Active,
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn schedule_policy(mut self, policy: impl Into<String>) -> Self {
        self.schedule_policy = Some(policy.into());
        self
    }

    pub fn rules(mut self, pre: Option<String>, post: Option<String>) -> Self {
        self.pre_rule = pre;
        self.post_rule = post;
        self
    }

    pub fn incremental_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn state(mut self, state: LifecycleState) -> Self {
        self.initial_state = state;
        self
    }
}

/// A cluster registered by one principal. The same physical cluster is
/// registered separately by every principal that works with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub uid: ClusterId,
    pub name: String,
    pub owner: PrincipalId,
    pub org_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreObject {
    pub name: String,
    pub backup: BackupUid,
    pub target_cluster: ClusterId,
    pub owner: PrincipalId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Creating.can_transition_to(Active));
        assert!(Active.can_transition_to(DeletePending));
        assert!(Active.can_transition_to(CloudBackupMissing));
        assert!(DeletePending.can_transition_to(Deleting));
        assert!(Deleting.can_transition_to(Deleted));
        assert!(Active.can_transition_to(Active));

        assert!(!Deleted.can_transition_to(Active));
        assert!(!Active.can_transition_to(Deleted));
        assert!(!DeletePending.can_transition_to(Active));
    }

    #[test]
    fn test_deleting_states() {
        assert!(LifecycleState::DeletePending.is_deleting());
        assert!(LifecycleState::Deleting.is_deleting());
        assert!(!LifecycleState::Deleted.is_deleting());
        assert!(!LifecycleState::Active.is_deleting());
    }

    #[test]
    fn test_backup_spec_builder() {
        let spec = BackupSpec::new("inc-1", "src")
            .location("s3-loc")
            .incremental_of("full-1");
        assert_eq!(spec.location.as_deref(), Some("s3-loc"));
        assert_eq!(spec.parent.as_deref(), Some("full-1"));
        assert_eq!(spec.initial_state, LifecycleState::Active);
    }
}
