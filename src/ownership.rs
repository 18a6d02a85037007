//! Ownership of auxiliary objects
//!
//! Backup locations, schedule policies, rules and cloud credentials use the
//! coarse `Read`/`Write` collaborator lattice, separate from backup access
//! levels. `Write` is needed to use an object as an input when creating a
//! backup or schedule; `Read` only makes it show up in listings.

use crate::directory::PrincipalDirectory;
use crate::error::{AclError, Result};
use crate::model::{
    AuxKind, AuxiliaryObject, Caller, Capability, CollaboratorAccess, OwnershipRecord,
    OwnershipUpdate, PrincipalId,
};
use crate::validation::validate_name;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

fn creation_capability(kind: AuxKind) -> Capability {
    match kind {
        AuxKind::BackupLocation => Capability::CreateBackupLocation,
        AuxKind::SchedulePolicy => Capability::CreateSchedulePolicy,
        AuxKind::Rule => Capability::CreateRule,
        AuxKind::CloudCredential => Capability::CreateCloudCredential,
    }
}

pub struct OwnershipManager {
    directory: Arc<PrincipalDirectory>,
    objects: RwLock<AHashMap<(AuxKind, String), AuxiliaryObject>>,
}

impl OwnershipManager {
    pub fn new(directory: Arc<PrincipalDirectory>) -> Self {
        OwnershipManager {
            directory,
            objects: RwLock::new(AHashMap::new()),
        }
    }

    pub fn create(&self, caller: &Caller, kind: AuxKind, name: &str, now: DateTime<Utc>) -> Result<String> {
        let name = validate_name(name)?;
        self.directory
            .require_capability(caller, creation_capability(kind))?;

        let mut objects = self.objects.write();
        let key = (kind, name.clone());
        if objects.contains_key(&key) {
            return Err(AclError::Conflict(format!("{} [{}] already exists", kind, name)));
        }

        let uid = uuid::Uuid::new_v4().to_string();
        objects.insert(
            key,
            AuxiliaryObject {
                kind,
                name: name.clone(),
                uid: uid.clone(),
                ownership: OwnershipRecord::owned_by(caller.principal_id()),
                created_at: now,
            },
        );

        info!("Created {} '{}' owned by {}", kind, name, caller.principal_id());
        Ok(uid)
    }

    /// Access `caller` holds on an existing object
    fn access_on(&self, caller: &Caller, record: &OwnershipRecord) -> CollaboratorAccess {
        match caller {
            Caller::Admin => CollaboratorAccess::Write,
            Caller::User(id) => {
                let groups = self.directory.groups_of(id);
                record.access_of(id, groups.iter())
            }
            Caller::ServiceAccount(id) => record.access_of(id, std::iter::empty()),
        }
    }

    /// Require `need` on the object. No access at all reads as NotFound;
    /// `Read` where `Write` is needed is PermissionDenied.
    pub fn check(&self, caller: &Caller, kind: AuxKind, name: &str, need: CollaboratorAccess) -> Result<()> {
        let objects = self.objects.read();
        let object = objects
            .get(&(kind, name.to_string()))
            .ok_or_else(|| AclError::not_found(kind.display_name(), name))?;

        let access = self.access_on(caller, &object.ownership);
        if access.permits(need) {
            return Ok(());
        }
        if access == CollaboratorAccess::Invalid {
            return Err(AclError::not_found(kind.display_name(), name));
        }
        Err(AclError::denied(
            self.directory.caller_name(caller),
            "use",
            format!("{} [{}]", kind, name),
        ))
    }

    /// Replace collaborator entries for the listed principals and set the
    /// public access. Only the owner or an administrator may do this.
    pub fn update_ownership(&self, caller: &Caller, kind: AuxKind, name: &str, update: &OwnershipUpdate) -> Result<()> {
        let targets = self.directory.resolve_principals(&update.groups, &update.users)?;

        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| AclError::not_found(kind.display_name(), name))?;

        let principal = caller.principal_id();
        if !caller.is_admin() && object.ownership.owner != principal {
            let access = self.access_on(caller, &object.ownership);
            if access == CollaboratorAccess::Invalid {
                return Err(AclError::not_found(kind.display_name(), name));
            }
            return Err(AclError::denied(
                self.directory.caller_name(caller),
                "update ownership of",
                format!("{} [{}]", kind, name),
            ));
        }

        for target in targets {
            if target.id == object.ownership.owner {
                continue;
            }
            object.ownership.set_collaborator(target.id, update.access);
        }
        object.ownership.public_access = update.inverse_access;

        info!(
            "Updated ownership of {} '{}': {} collaborators, public {:?}",
            kind,
            name,
            object.ownership.collaborators.len(),
            object.ownership.public_access
        );
        Ok(())
    }

    /// Names of objects of `kind` the caller can at least read
    pub fn list(&self, caller: &Caller, kind: AuxKind) -> Vec<String> {
        let objects = self.objects.read();
        let mut names: Vec<String> = objects
            .values()
            .filter(|o| o.kind == kind)
            .filter(|o| self.access_on(caller, &o.ownership).permits(CollaboratorAccess::Read))
            .map(|o| o.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn transfer_ownership(&self, caller: &Caller, kind: AuxKind, name: &str, new_owner: &str) -> Result<()> {
        let new_owner = self.directory.user_id(new_owner)?;

        let mut objects = self.objects.write();
        let object = objects
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| AclError::not_found(kind.display_name(), name))?;

        if !caller.is_admin() && object.ownership.owner != caller.principal_id() {
            return Err(AclError::denied(
                self.directory.caller_name(caller),
                "transfer ownership of",
                format!("{} [{}]", kind, name),
            ));
        }

        object.ownership.collaborators.remove(&new_owner);
        let previous = std::mem::replace(&mut object.ownership.owner, new_owner.clone());
        info!("Transferred {} '{}' from {} to {}", kind, name, previous, new_owner);
        Ok(())
    }

    /// Reassign everything `owner` held to the administrator and drop its
    /// collaborator entries. Returns the number of objects reassigned.
    pub fn handle_owner_deleted(&self, owner: &PrincipalId) -> usize {
        let mut objects = self.objects.write();
        let mut reassigned = 0;
        for object in objects.values_mut() {
            if &object.ownership.owner == owner {
                object.ownership.owner = PrincipalId::admin();
                reassigned += 1;
            }
            object.ownership.collaborators.remove(owner);
        }
        if reassigned > 0 {
            info!("Reassigned {} objects of deleted principal {} to admin", reassigned, owner);
        }
        reassigned
    }

    /// Drop collaborator entries naming `principal` (e.g. a deleted group)
    pub fn strip_principal(&self, principal: &PrincipalId) {
        let mut objects = self.objects.write();
        for object in objects.values_mut() {
            object.ownership.collaborators.remove(principal);
        }
        debug!("Removed {} from auxiliary collaborator lists", principal);
    }

    pub fn ownership(&self, kind: AuxKind, name: &str) -> Option<OwnershipRecord> {
        self.objects
            .read()
            .get(&(kind, name.to_string()))
            .map(|o| o.ownership.clone())
    }

    pub fn delete(&self, caller: &Caller, kind: AuxKind, name: &str) -> Result<()> {
        let mut objects = self.objects.write();
        let key = (kind, name.to_string());
        let owner = objects
            .get(&key)
            .map(|o| o.ownership.owner.clone())
            .ok_or_else(|| AclError::not_found(kind.display_name(), name))?;
        if !caller.is_admin() && owner != caller.principal_id() {
            return Err(AclError::denied(
                self.directory.caller_name(caller),
                "delete",
                format!("{} [{}]", kind, name),
            ));
        }
        objects.remove(&key);
        info!("Deleted {} '{}'", kind, name);
        Ok(())
    }
}
