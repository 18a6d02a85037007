//! Principals, roles and caller context

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier of a user or group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Identifier under which administrative callers own objects
    pub const ADMIN: &'static str = "admin";

    pub fn new(id: impl Into<String>) -> Self {
        PrincipalId(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        PrincipalId(uuid::Uuid::new_v4().to_string())
    }

    pub fn admin() -> Self {
        PrincipalId(Self::ADMIN.to_string())
    }

    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        PrincipalId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(PrincipalKind::User),
            "group" => Some(PrincipalKind::Group),
            _ => None,
        }
    }
}

/// A user or group that can hold grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub name: String,
}

/// Named capability bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "px-backup-app.admin")]
    ApplicationOwner,
    #[serde(rename = "px-backup-app.user")]
    ApplicationUser,
    #[serde(rename = "px-backup-infra.admin")]
    InfrastructureOwner,
    #[serde(rename = "default-roles-master")]
    DefaultRoles,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ApplicationOwner => "px-backup-app.admin",
            Role::ApplicationUser => "px-backup-app.user",
            Role::InfrastructureOwner => "px-backup-infra.admin",
            Role::DefaultRoles => "default-roles-master",
        }
    }

    /// Baseline capabilities, independent of object-level grants
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::InfrastructureOwner => &[
                RegisterCluster,
                CreateCloudCredential,
                CreateBackupLocation,
                CreateSchedulePolicy,
                CreateRule,
                CreateBackup,
                CreateRestore,
            ],
            Role::ApplicationOwner => &[
                RegisterCluster,
                CreateSchedulePolicy,
                CreateRule,
                CreateBackup,
                CreateRestore,
            ],
            // Application users work with infrastructure shared to them
            Role::ApplicationUser | Role::DefaultRoles => {
                &[RegisterCluster, CreateBackup, CreateRestore]
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abilities granted by roles rather than by object grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    RegisterCluster,
    CreateCloudCredential,
    CreateBackupLocation,
    CreateSchedulePolicy,
    CreateRule,
    CreateBackup,
    CreateRestore,
}

impl Capability {
    /// Verb phrase used in permission messages
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::RegisterCluster => "register cluster",
            Capability::CreateCloudCredential => "create cloud credential",
            Capability::CreateBackupLocation => "create backup location",
            Capability::CreateSchedulePolicy => "create schedule policy",
            Capability::CreateRule => "create rule",
            Capability::CreateBackup => "create backup",
            Capability::CreateRestore => "create restore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Assigned roles with the reason recorded at assignment
    pub roles: BTreeMap<Role, String>,
    pub groups: BTreeSet<PrincipalId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: PrincipalId,
    pub name: String,
    pub members: BTreeSet<PrincipalId>,
    pub roles: BTreeMap<Role, String>,
}

/// Who is invoking an operation
///
/// Administrative capability is an explicit variant, never inferred from
/// the shape of a context object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    Admin,
    User(PrincipalId),
    ServiceAccount(PrincipalId),
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Admin)
    }

    /// Identifier recorded as owner / grantor for this caller
    pub fn principal_id(&self) -> PrincipalId {
        match self {
            Caller::Admin => PrincipalId::admin(),
            Caller::User(id) | Caller::ServiceAccount(id) => id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_identity() {
        assert!(Caller::Admin.is_admin());
        assert!(Caller::Admin.principal_id().is_admin());

        let user = Caller::User(PrincipalId::new("u-1"));
        assert!(!user.is_admin());
        assert_eq!(user.principal_id().as_str(), "u-1");
    }

    #[test]
    fn test_role_capabilities() {
        assert!(Role::InfrastructureOwner
            .capabilities()
            .contains(&Capability::CreateBackupLocation));
        assert!(!Role::ApplicationUser
            .capabilities()
            .contains(&Capability::CreateRule));
        assert!(Role::DefaultRoles
            .capabilities()
            .contains(&Capability::RegisterCluster));
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&Role::ApplicationOwner).unwrap();
        assert_eq!(json, "\"px-backup-app.admin\"");
        let parsed: Role = serde_json::from_str("\"px-backup-infra.admin\"").unwrap();
        assert_eq!(parsed, Role::InfrastructureOwner);
    }
}
