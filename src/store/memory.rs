//! In-memory grant store

use super::GrantStore;
use crate::error::Result;
use crate::model::{AccessGrant, BackupUid, ClusterId, ClusterShareRule, GrantOrigin, PrincipalId};
use ahash::AHashMap;
use parking_lot::RwLock;

#[derive(Default)]
struct Tables {
    grants: AHashMap<(BackupUid, PrincipalId), AccessGrant>,
    rules: AHashMap<(ClusterId, PrincipalId), ClusterShareRule>,
}

/// Grant store held entirely in process memory
#[derive(Default)]
pub struct MemoryGrantStore {
    tables: RwLock<Tables>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GrantStore for MemoryGrantStore {
    fn put_grant(&self, grant: AccessGrant) -> Result<Option<AccessGrant>> {
        let key = (grant.object.clone(), grant.principal.clone());
        Ok(self.tables.write().grants.insert(key, grant))
    }

    fn put_cluster_grant(&self, grant: AccessGrant) -> Result<bool> {
        let key = (grant.object.clone(), grant.principal.clone());
        let mut tables = self.tables.write();
        if let Some(existing) = tables.grants.get(&key) {
            if existing.origin == GrantOrigin::Direct || existing.same_effect(&grant) {
                return Ok(false);
            }
        }
        tables.grants.insert(key, grant);
        Ok(true)
    }

    fn grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<Option<AccessGrant>> {
        let key = (object.clone(), principal.clone());
        Ok(self.tables.read().grants.get(&key).cloned())
    }

    fn grants_for_object(&self, object: &BackupUid) -> Result<Vec<AccessGrant>> {
        let tables = self.tables.read();
        let mut grants: Vec<AccessGrant> = tables
            .grants
            .values()
            .filter(|g| &g.object == object)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.principal.cmp(&b.principal));
        Ok(grants)
    }

    fn grants_for_principal(&self, principal: &PrincipalId) -> Result<Vec<AccessGrant>> {
        let tables = self.tables.read();
        let mut grants: Vec<AccessGrant> = tables
            .grants
            .values()
            .filter(|g| &g.principal == principal)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.object.cmp(&b.object));
        Ok(grants)
    }

    fn remove_grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<bool> {
        let key = (object.clone(), principal.clone());
        Ok(self.tables.write().grants.remove(&key).is_some())
    }

    fn remove_cluster_grants(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.grants.len();
        tables
            .grants
            .retain(|_, g| !(&g.principal == principal && g.origin.cluster() == Some(cluster)));
        Ok(before - tables.grants.len())
    }

    fn remove_grants_for_object(&self, object: &BackupUid) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.grants.len();
        tables.grants.retain(|(obj, _), _| obj != object);
        Ok(before - tables.grants.len())
    }

    fn remove_grants_for_principal(&self, principal: &PrincipalId) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.grants.len();
        tables.grants.retain(|(_, p), _| p != principal);
        Ok(before - tables.grants.len())
    }

    fn put_rule(&self, rule: ClusterShareRule) -> Result<()> {
        let key = (rule.cluster.clone(), rule.principal.clone());
        self.tables.write().rules.insert(key, rule);
        Ok(())
    }

    fn rule(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<Option<ClusterShareRule>> {
        let key = (cluster.clone(), principal.clone());
        Ok(self.tables.read().rules.get(&key).cloned())
    }

    fn rules_for_cluster(&self, cluster: &ClusterId) -> Result<Vec<ClusterShareRule>> {
        let tables = self.tables.read();
        let mut rules: Vec<ClusterShareRule> = tables
            .rules
            .values()
            .filter(|r| &r.cluster == cluster)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.principal.cmp(&b.principal));
        Ok(rules)
    }

    fn remove_rules_for_principal(&self, principal: &PrincipalId) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.rules.len();
        tables.rules.retain(|(_, p), _| p != principal);
        Ok(before - tables.rules.len())
    }

    fn remove_rules_for_cluster(&self, cluster: &ClusterId) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.rules.len();
        tables.rules.retain(|(c, _), _| c != cluster);
        Ok(before - tables.rules.len())
    }

    fn grant_count(&self) -> Result<usize> {
        Ok(self.tables.read().grants.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessLevel, PrincipalKind};
    use chrono::Utc;

    fn grant(object: &str, principal: &str, level: AccessLevel) -> AccessGrant {
        AccessGrant::direct(
            BackupUid::new(object),
            PrincipalId::new(principal),
            level,
            PrincipalId::admin(),
            Utc::now(),
        )
    }

    #[test]
    fn test_put_overwrites_pair() {
        let store = MemoryGrantStore::new();
        assert!(store.put_grant(grant("b1", "u1", AccessLevel::Full)).unwrap().is_none());

        let previous = store
            .put_grant(grant("b1", "u1", AccessLevel::ViewOnly))
            .unwrap()
            .unwrap();
        assert_eq!(previous.level, AccessLevel::Full);
        assert_eq!(store.grant_count().unwrap(), 1);

        let current = store
            .grant(&BackupUid::new("b1"), &PrincipalId::new("u1"))
            .unwrap()
            .unwrap();
        assert_eq!(current.level, AccessLevel::ViewOnly);
    }

    #[test]
    fn test_cluster_grant_never_replaces_direct() {
        let store = MemoryGrantStore::new();
        store.put_grant(grant("b1", "u1", AccessLevel::ViewOnly)).unwrap();

        let fanned = AccessGrant::from_cluster(
            BackupUid::new("b1"),
            PrincipalId::new("u1"),
            AccessLevel::Full,
            PrincipalId::admin(),
            Utc::now(),
            ClusterId::new("c1"),
        );
        assert!(!store.put_cluster_grant(fanned.clone()).unwrap());
        let current = store
            .grant(&BackupUid::new("b1"), &PrincipalId::new("u1"))
            .unwrap()
            .unwrap();
        assert_eq!(current.origin, GrantOrigin::Direct);
        assert_eq!(current.level, AccessLevel::ViewOnly);

        let other = AccessGrant {
            principal: PrincipalId::new("u2"),
            ..fanned
        };
        assert!(store.put_cluster_grant(other.clone()).unwrap());
        assert!(!store.put_cluster_grant(other).unwrap());
        assert_eq!(store.grant_count().unwrap(), 2);
    }

    #[test]
    fn test_cascade_removal() {
        let store = MemoryGrantStore::new();
        store.put_grant(grant("b1", "u1", AccessLevel::Full)).unwrap();
        store.put_grant(grant("b1", "u2", AccessLevel::Full)).unwrap();
        store.put_grant(grant("b2", "u1", AccessLevel::Full)).unwrap();

        assert_eq!(store.remove_grants_for_object(&BackupUid::new("b1")).unwrap(), 2);
        assert_eq!(store.grant_count().unwrap(), 1);
        assert_eq!(
            store.remove_grants_for_principal(&PrincipalId::new("u1")).unwrap(),
            1
        );
        assert_eq!(store.grant_count().unwrap(), 0);
    }

    #[test]
    fn test_cluster_grants_removed_by_origin() {
        let store = MemoryGrantStore::new();
        let cluster = ClusterId::new("c1");
        store
            .put_grant(AccessGrant::from_cluster(
                BackupUid::new("b1"),
                PrincipalId::new("g1"),
                AccessLevel::Full,
                PrincipalId::admin(),
                Utc::now(),
                cluster.clone(),
            ))
            .unwrap();
        store.put_grant(grant("b2", "g1", AccessLevel::Restore)).unwrap();

        assert_eq!(
            store
                .remove_cluster_grants(&cluster, &PrincipalId::new("g1"))
                .unwrap(),
            1
        );
        assert_eq!(store.grant_count().unwrap(), 1);
    }

    #[test]
    fn test_rules_keyed_by_cluster_and_principal() {
        let store = MemoryGrantStore::new();
        let rule = ClusterShareRule {
            cluster: ClusterId::new("c1"),
            principal: PrincipalId::new("g1"),
            kind: PrincipalKind::Group,
            level: AccessLevel::Restore,
            enabled: true,
            updated_by: PrincipalId::admin(),
            updated_at: Utc::now(),
        };
        store.put_rule(rule.clone()).unwrap();
        store
            .put_rule(ClusterShareRule {
                enabled: false,
                ..rule.clone()
            })
            .unwrap();

        let rules = store.rules_for_cluster(&ClusterId::new("c1")).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(!rules[0].enabled);
    }
}
