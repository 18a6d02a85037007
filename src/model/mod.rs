//! Domain types shared by the directory, stores and engine

pub mod access;
pub mod auxiliary;
pub mod backup;
pub mod grant;
pub mod principal;

pub use access::{combine, AccessLevel, CollaboratorAccess, EffectiveAccess, Operation};
pub use auxiliary::{AuxKind, AuxiliaryObject, OwnershipRecord, OwnershipUpdate};
pub use backup::{
    BackupObject, BackupRef, BackupSpec, BackupUid, Cluster, ClusterId, LifecycleState,
    RestoreObject,
};
pub use grant::{AccessGrant, ClusterShareRule, GrantOrigin};
pub use principal::{Caller, Capability, Group, Principal, PrincipalId, PrincipalKind, Role, User};
