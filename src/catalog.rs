//! Catalog of registered clusters, backups and restores
//!
//! The catalog only stores objects. Authorization happens in the gate
//! before any mutation reaches it.

use crate::error::{AclError, Result};
use crate::model::{
    BackupObject, BackupUid, Cluster, ClusterId, LifecycleState, PrincipalId, RestoreObject,
};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct Inner {
    backups: AHashMap<BackupUid, BackupObject>,
    clusters: AHashMap<ClusterId, Cluster>,
    /// (owner, cluster name) -> cluster uid
    cluster_names: AHashMap<(PrincipalId, String), ClusterId>,
    /// (owner, restore name) -> restore
    restores: AHashMap<(PrincipalId, String), RestoreObject>,
}

#[derive(Default)]
pub struct BackupCatalog {
    inner: RwLock<Inner>,
}

impl BackupCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_cluster(
        &self,
        owner: &PrincipalId,
        name: &str,
        org_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClusterId> {
        let mut inner = self.inner.write();
        let key = (owner.clone(), name.to_string());
        if inner.cluster_names.contains_key(&key) {
            return Err(AclError::Conflict(format!("cluster [{}] already exists", name)));
        }

        let uid = ClusterId::generate();
        inner.clusters.insert(
            uid.clone(),
            Cluster {
                uid: uid.clone(),
                name: name.to_string(),
                owner: owner.clone(),
                org_id: org_id.to_string(),
                created_at: now,
            },
        );
        inner.cluster_names.insert(key, uid.clone());

        info!("Registered cluster '{}' ({}) for {}", name, uid, owner);
        Ok(uid)
    }

    /// Cluster uid in `owner`'s scope
    pub fn cluster_uid(&self, owner: &PrincipalId, name: &str) -> Result<ClusterId> {
        self.inner
            .read()
            .cluster_names
            .get(&(owner.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| AclError::not_found("cluster", name))
    }

    pub fn cluster(&self, uid: &ClusterId) -> Option<Cluster> {
        self.inner.read().clusters.get(uid).cloned()
    }

    pub fn clusters_of(&self, owner: &PrincipalId) -> Vec<Cluster> {
        let inner = self.inner.read();
        let mut clusters: Vec<Cluster> = inner
            .clusters
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        clusters
    }

    pub fn delete_cluster(&self, owner: &PrincipalId, name: &str) -> Result<Cluster> {
        let mut inner = self.inner.write();
        let uid = inner
            .cluster_names
            .remove(&(owner.clone(), name.to_string()))
            .ok_or_else(|| AclError::not_found("cluster", name))?;
        let cluster = inner
            .clusters
            .remove(&uid)
            .ok_or_else(|| AclError::not_found("cluster", name))?;
        info!("Deleted cluster '{}' ({})", name, uid);
        Ok(cluster)
    }

    /// Add a backup; names are unique among one owner's live backups
    pub fn insert_backup(&self, backup: BackupObject) -> Result<()> {
        let mut inner = self.inner.write();
        let clash = inner
            .backups
            .values()
            .any(|b| b.owner == backup.owner && b.name == backup.name && !b.state.is_deleted());
        if clash {
            return Err(AclError::Conflict(format!(
                "backup [{}] already exists",
                backup.name
            )));
        }

        debug!("Cataloged backup '{}' ({})", backup.name, backup.uid);
        inner.backups.insert(backup.uid.clone(), backup);
        Ok(())
    }

    pub fn backup(&self, uid: &BackupUid) -> Option<BackupObject> {
        self.inner.read().backups.get(uid).cloned()
    }

    /// `owner`'s live backup named `name`
    pub fn owned_backup_named(&self, owner: &PrincipalId, name: &str) -> Option<BackupObject> {
        self.inner
            .read()
            .backups
            .values()
            .find(|b| &b.owner == owner && b.name == name && !b.state.is_deleted())
            .cloned()
    }

    /// Every live backup named `name`, oldest first
    pub fn backups_named(&self, name: &str) -> Vec<BackupObject> {
        self.live(|b| b.name == name)
    }

    pub fn backups_in_cluster(&self, cluster: &ClusterId) -> Vec<BackupObject> {
        self.live(|b| &b.cluster == cluster)
    }

    pub fn backups_owned_by(&self, owner: &PrincipalId) -> Vec<BackupObject> {
        self.live(|b| &b.owner == owner)
    }

    pub fn all_backups(&self) -> Vec<BackupObject> {
        self.live(|_| true)
    }

    fn live<P>(&self, predicate: P) -> Vec<BackupObject>
    where
        P: Fn(&BackupObject) -> bool,
    {
        let inner = self.inner.read();
        let mut backups: Vec<BackupObject> = inner
            .backups
            .values()
            .filter(|b| !b.state.is_deleted() && predicate(b))
            .cloned()
            .collect();
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        backups
    }

    /// Move a backup to `next`, returning the previous state.
    /// Repeating the current state is accepted.
    pub fn set_state(&self, uid: &BackupUid, next: LifecycleState) -> Result<LifecycleState> {
        let mut inner = self.inner.write();
        let backup = inner
            .backups
            .get_mut(uid)
            .ok_or_else(|| AclError::not_found("backup", uid))?;

        let previous = backup.state;
        if !previous.can_transition_to(next) {
            return Err(AclError::InvalidArgument(format!(
                "backup [{}] cannot move from {} to {}",
                backup.name, previous, next
            )));
        }
        backup.state = next;

        if previous != next {
            info!("Backup '{}' ({}): {} -> {}", backup.name, uid, previous, next);
        }
        Ok(previous)
    }

    /// Move a backup to `DeletePending` unless deletion is already under way.
    /// Returns false when another request got there first.
    pub fn request_deletion(&self, uid: &BackupUid) -> Result<bool> {
        let mut inner = self.inner.write();
        let backup = inner
            .backups
            .get_mut(uid)
            .ok_or_else(|| AclError::not_found("backup", uid))?;

        if backup.state.is_deleting() {
            return Ok(false);
        }
        if !backup.state.can_transition_to(LifecycleState::DeletePending) {
            return Err(AclError::not_found("backup", &backup.name));
        }

        info!("Backup '{}' ({}): {} -> DeletePending", backup.name, uid, backup.state);
        backup.state = LifecycleState::DeletePending;
        Ok(true)
    }

    /// Hand a backup to `owner`. Fails with `Conflict` when `owner` already
    /// has a live backup of the same name.
    pub fn set_owner(&self, uid: &BackupUid, owner: PrincipalId) -> Result<PrincipalId> {
        let mut inner = self.inner.write();
        let name = inner
            .backups
            .get(uid)
            .map(|b| b.name.clone())
            .ok_or_else(|| AclError::not_found("backup", uid))?;
        let clash = inner
            .backups
            .values()
            .any(|b| &b.uid != uid && b.owner == owner && b.name == name && !b.state.is_deleted());
        if clash {
            return Err(AclError::Conflict(format!(
                "backup [{}] already exists for the new owner",
                name
            )));
        }

        let backup = inner
            .backups
            .get_mut(uid)
            .ok_or_else(|| AclError::not_found("backup", uid))?;
        let previous = std::mem::replace(&mut backup.owner, owner);
        backup.orphaned = false;
        Ok(previous)
    }

    /// Flag every backup of a deleted principal; returns the affected uids
    pub fn mark_orphaned(&self, owner: &PrincipalId) -> Vec<BackupUid> {
        let mut inner = self.inner.write();
        let mut uids = Vec::new();
        for backup in inner.backups.values_mut() {
            if &backup.owner == owner && !backup.state.is_deleted() {
                backup.orphaned = true;
                uids.push(backup.uid.clone());
            }
        }
        uids.sort();
        uids
    }

    pub fn insert_restore(&self, restore: RestoreObject) -> Result<()> {
        let mut inner = self.inner.write();
        let key = (restore.owner.clone(), restore.name.clone());
        if inner.restores.contains_key(&key) {
            return Err(AclError::Conflict(format!(
                "restore [{}] already exists",
                restore.name
            )));
        }
        inner.restores.insert(key, restore);
        Ok(())
    }

    pub fn restore(&self, owner: &PrincipalId, name: &str) -> Option<RestoreObject> {
        self.inner
            .read()
            .restores
            .get(&(owner.clone(), name.to_string()))
            .cloned()
    }

    /// Every restore named `name`, across owners
    pub fn restores_named(&self, name: &str) -> Vec<RestoreObject> {
        let inner = self.inner.read();
        let mut restores: Vec<RestoreObject> = inner
            .restores
            .values()
            .filter(|r| r.name == name)
            .cloned()
            .collect();
        restores.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        restores
    }

    pub fn remove_restore(&self, owner: &PrincipalId, name: &str) -> Result<RestoreObject> {
        self.inner
            .write()
            .restores
            .remove(&(owner.clone(), name.to_string()))
            .ok_or_else(|| AclError::not_found("restore", name))
    }
}
