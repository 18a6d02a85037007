//! Stored grant records

use super::access::AccessLevel;
use super::backup::{BackupUid, ClusterId};
use super::principal::{PrincipalId, PrincipalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a grant row came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "cluster", rename_all = "lowercase")]
pub enum GrantOrigin {
    /// Written by an explicit share call
    Direct,
    /// Fanned out from a cluster share rule
    Cluster(ClusterId),
}

impl GrantOrigin {
    pub fn cluster(&self) -> Option<&ClusterId> {
        match self {
            GrantOrigin::Direct => None,
            GrantOrigin::Cluster(id) => Some(id),
        }
    }
}

/// `(object, principal) -> level`, unique per pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub object: BackupUid,
    pub principal: PrincipalId,
    pub level: AccessLevel,
    pub granted_by: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub origin: GrantOrigin,
}

impl AccessGrant {
    pub fn direct(
        object: BackupUid,
        principal: PrincipalId,
        level: AccessLevel,
        granted_by: PrincipalId,
        created_at: DateTime<Utc>,
    ) -> Self {
        AccessGrant {
            object,
            principal,
            level,
            granted_by,
            created_at,
            origin: GrantOrigin::Direct,
        }
    }

    pub fn from_cluster(
        object: BackupUid,
        principal: PrincipalId,
        level: AccessLevel,
        granted_by: PrincipalId,
        created_at: DateTime<Utc>,
        cluster: ClusterId,
    ) -> Self {
        AccessGrant {
            object,
            principal,
            level,
            granted_by,
            created_at,
            origin: GrantOrigin::Cluster(cluster),
        }
    }

    /// Same effect as `other`, ignoring who wrote it and when
    pub fn same_effect(&self, other: &AccessGrant) -> bool {
        self.object == other.object
            && self.principal == other.principal
            && self.level == other.level
            && self.origin == other.origin
    }
}

/// Standing directive: every backup of `cluster` is visible to `principal`
/// at `level` while `enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterShareRule {
    pub cluster: ClusterId,
    pub principal: PrincipalId,
    pub kind: PrincipalKind,
    pub level: AccessLevel,
    pub enabled: bool,
    pub updated_by: PrincipalId,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_effect_ignores_metadata() {
        let now = Utc::now();
        let a = AccessGrant::direct(
            BackupUid::new("b-1"),
            PrincipalId::new("u-1"),
            AccessLevel::Restore,
            PrincipalId::admin(),
            now,
        );
        let mut b = a.clone();
        b.granted_by = PrincipalId::new("owner");
        b.created_at = now + chrono::Duration::seconds(30);
        assert!(a.same_effect(&b));

        b.level = AccessLevel::Full;
        assert!(!a.same_effect(&b));
    }

    #[test]
    fn test_origin_serde() {
        let origin = GrantOrigin::Cluster(ClusterId::new("c-1"));
        let json = serde_json::to_string(&origin).unwrap();
        assert_eq!(json, r#"{"kind":"cluster","cluster":"c-1"}"#);
        assert_eq!(origin.cluster().map(|c| c.as_str()), Some("c-1"));
        assert!(GrantOrigin::Direct.cluster().is_none());
    }
}
