//! Principal directory: users, groups, membership and roles
//!
//! Names are unique per kind and are what callers pass around; ids are
//! what grants and ownership records store. A user and a group may share a
//! name.

use crate::error::{AclError, Result};
use crate::model::{Caller, Capability, Group, Principal, PrincipalId, PrincipalKind, Role, User};
use crate::validation::validate_name;
use ahash::AHashMap;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Default)]
struct Inner {
    users: AHashMap<PrincipalId, User>,
    groups: AHashMap<PrincipalId, Group>,
    user_names: AHashMap<String, PrincipalId>,
    group_names: AHashMap<String, PrincipalId>,
}

impl Inner {
    fn user_id(&self, name: &str) -> Result<PrincipalId> {
        self.user_names
            .get(name)
            .cloned()
            .ok_or_else(|| AclError::not_found("user", name))
    }

    fn group_id(&self, name: &str) -> Result<PrincipalId> {
        self.group_names
            .get(name)
            .cloned()
            .ok_or_else(|| AclError::not_found("group", name))
    }
}

pub struct PrincipalDirectory {
    inner: RwLock<Inner>,
}

impl PrincipalDirectory {
    /// Create a directory holding only the administrative user `admin_name`
    pub fn new(admin_name: &str) -> Self {
        let mut inner = Inner::default();
        let admin = PrincipalId::admin();
        let mut roles = BTreeMap::new();
        roles.insert(Role::InfrastructureOwner, "built-in administrator".to_string());
        inner.users.insert(
            admin.clone(),
            User {
                id: admin.clone(),
                name: admin_name.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
                roles,
                groups: BTreeSet::new(),
            },
        );
        inner.user_names.insert(admin_name.to_string(), admin);

        PrincipalDirectory {
            inner: RwLock::new(inner),
        }
    }

    pub fn add_user(&self, name: &str, first_name: &str, last_name: &str, email: &str) -> Result<PrincipalId> {
        let name = validate_name(name)?;
        let mut inner = self.inner.write();
        if inner.user_names.contains_key(&name) {
            return Err(AclError::Conflict(format!("user [{}] already exists", name)));
        }

        let id = PrincipalId::generate();
        inner.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                name: name.clone(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: email.to_string(),
                roles: BTreeMap::new(),
                groups: BTreeSet::new(),
            },
        );
        inner.user_names.insert(name.clone(), id.clone());

        info!("Added user '{}' ({})", name, id);
        Ok(id)
    }

    /// Remove a user and its group memberships. Grants and owned objects are
    /// handled by the engine.
    pub fn delete_user(&self, name: &str) -> Result<User> {
        let mut inner = self.inner.write();
        let id = inner.user_id(name)?;
        if id.is_admin() {
            return Err(AclError::InvalidArgument(
                "the administrative user cannot be deleted".to_string(),
            ));
        }

        inner.user_names.remove(name);
        let user = inner
            .users
            .remove(&id)
            .ok_or_else(|| AclError::not_found("user", name))?;
        for group_id in &user.groups {
            if let Some(group) = inner.groups.get_mut(group_id) {
                group.members.remove(&id);
            }
        }

        info!("Deleted user '{}' ({})", name, id);
        Ok(user)
    }

    pub fn add_group(&self, name: &str) -> Result<PrincipalId> {
        let name = validate_name(name)?;
        let mut inner = self.inner.write();
        if inner.group_names.contains_key(&name) {
            return Err(AclError::Conflict(format!("group [{}] already exists", name)));
        }

        let id = PrincipalId::generate();
        inner.groups.insert(
            id.clone(),
            Group {
                id: id.clone(),
                name: name.clone(),
                members: BTreeSet::new(),
                roles: BTreeMap::new(),
            },
        );
        inner.group_names.insert(name.clone(), id.clone());

        info!("Added group '{}' ({})", name, id);
        Ok(id)
    }

    /// Remove a group. Former members keep their own grants.
    pub fn delete_group(&self, name: &str) -> Result<Group> {
        let mut inner = self.inner.write();
        let id = inner.group_id(name)?;
        inner.group_names.remove(name);
        let group = inner
            .groups
            .remove(&id)
            .ok_or_else(|| AclError::not_found("group", name))?;
        for member in &group.members {
            if let Some(user) = inner.users.get_mut(member) {
                user.groups.remove(&id);
            }
        }

        info!("Deleted group '{}' ({})", name, id);
        Ok(group)
    }

    pub fn add_user_to_group(&self, user: &str, group: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let user_id = inner.user_id(user)?;
        let group_id = inner.group_id(group)?;

        if let Some(g) = inner.groups.get_mut(&group_id) {
            g.members.insert(user_id.clone());
        }
        if let Some(u) = inner.users.get_mut(&user_id) {
            u.groups.insert(group_id);
        }

        debug!("Added user '{}' to group '{}'", user, group);
        Ok(())
    }

    pub fn remove_user_from_group(&self, user: &str, group: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let user_id = inner.user_id(user)?;
        let group_id = inner.group_id(group)?;

        if let Some(g) = inner.groups.get_mut(&group_id) {
            g.members.remove(&user_id);
        }
        if let Some(u) = inner.users.get_mut(&user_id) {
            u.groups.remove(&group_id);
        }

        debug!("Removed user '{}' from group '{}'", user, group);
        Ok(())
    }

    /// Member user names, sorted
    pub fn members_of_group(&self, group: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let group_id = inner.group_id(group)?;
        let mut names: Vec<String> = inner
            .groups
            .get(&group_id)
            .map(|g| {
                g.members
                    .iter()
                    .filter_map(|m| inner.users.get(m).map(|u| u.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    pub fn random_user_from_group(&self, group: &str) -> Result<String> {
        let members = self.members_of_group(group)?;
        members
            .into_iter()
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| AclError::InvalidArgument(format!("group [{}] has no members", group)))
    }

    pub fn user_id(&self, name: &str) -> Result<PrincipalId> {
        self.inner.read().user_id(name)
    }

    pub fn group_id(&self, name: &str) -> Result<PrincipalId> {
        self.inner.read().group_id(name)
    }

    pub fn user(&self, id: &PrincipalId) -> Option<User> {
        self.inner.read().users.get(id).cloned()
    }

    pub fn group(&self, id: &PrincipalId) -> Option<Group> {
        self.inner.read().groups.get(id).cloned()
    }

    /// Groups `principal` currently belongs to
    pub fn groups_of(&self, principal: &PrincipalId) -> Vec<PrincipalId> {
        self.inner
            .read()
            .users
            .get(principal)
            .map(|u| u.groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Name for messages; falls back to the raw id for deleted principals
    pub fn display_name(&self, id: &PrincipalId) -> String {
        let inner = self.inner.read();
        if let Some(user) = inner.users.get(id) {
            return user.name.clone();
        }
        if let Some(group) = inner.groups.get(id) {
            return group.name.clone();
        }
        id.to_string()
    }

    pub fn caller_name(&self, caller: &Caller) -> String {
        self.display_name(&caller.principal_id())
    }

    /// Resolve share targets, failing on the first unknown name
    pub fn resolve_principals(&self, groups: &[String], users: &[String]) -> Result<Vec<Principal>> {
        let inner = self.inner.read();
        let mut resolved = Vec::with_capacity(groups.len() + users.len());
        for name in groups {
            resolved.push(Principal {
                id: inner.group_id(name)?,
                kind: PrincipalKind::Group,
                name: name.clone(),
            });
        }
        for name in users {
            resolved.push(Principal {
                id: inner.user_id(name)?,
                kind: PrincipalKind::User,
                name: name.clone(),
            });
        }
        Ok(resolved)
    }

    pub fn add_role_to_user(&self, user: &str, role: Role, reason: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let id = inner.user_id(user)?;
        if let Some(u) = inner.users.get_mut(&id) {
            u.roles.insert(role, reason.to_string());
        }
        info!("Assigned role {} to user '{}'", role, user);
        Ok(())
    }

    /// Remove `role` from `user`. Removing a role the user does not hold is
    /// not an error.
    pub fn delete_role_from_user(&self, user: &str, role: Role, reason: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let id = inner.user_id(user)?;
        if let Some(u) = inner.users.get_mut(&id) {
            u.roles.remove(&role);
        }
        info!("Removed role {} from user '{}': {}", role, user, reason);
        Ok(())
    }

    pub fn add_role_to_group(&self, group: &str, role: Role, reason: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let id = inner.group_id(group)?;
        if let Some(g) = inner.groups.get_mut(&id) {
            g.roles.insert(role, reason.to_string());
        }
        info!("Assigned role {} to group '{}'", role, group);
        Ok(())
    }

    pub fn delete_role_from_group(&self, group: &str, role: Role, reason: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let id = inner.group_id(group)?;
        if let Some(g) = inner.groups.get_mut(&id) {
            g.roles.remove(&role);
        }
        info!("Removed role {} from group '{}': {}", role, group, reason);
        Ok(())
    }

    /// Own roles, roles of every group, and the implicit default roles
    pub fn roles_of_user(&self, user: &str) -> Result<BTreeSet<Role>> {
        let inner = self.inner.read();
        let id = inner.user_id(user)?;
        Ok(Self::collect_roles(&inner, &id))
    }

    fn collect_roles(inner: &Inner, id: &PrincipalId) -> BTreeSet<Role> {
        let mut roles = BTreeSet::new();
        roles.insert(Role::DefaultRoles);
        if let Some(user) = inner.users.get(id) {
            roles.extend(user.roles.keys().copied());
            for group_id in &user.groups {
                if let Some(group) = inner.groups.get(group_id) {
                    roles.extend(group.roles.keys().copied());
                }
            }
        }
        roles
    }

    /// Role-derived capability check. Service accounts never hold roles
    /// and only get the default baseline.
    pub fn has_capability(&self, caller: &Caller, capability: Capability) -> bool {
        match caller {
            Caller::Admin => true,
            Caller::ServiceAccount(_) => Role::DefaultRoles.capabilities().contains(&capability),
            Caller::User(id) => {
                let inner = self.inner.read();
                if !inner.users.contains_key(id) {
                    return false;
                }
                Self::collect_roles(&inner, id)
                    .iter()
                    .any(|role| role.capabilities().contains(&capability))
            }
        }
    }

    pub fn require_capability(&self, caller: &Caller, capability: Capability) -> Result<()> {
        if self.has_capability(caller, capability) {
            Ok(())
        } else {
            Err(AclError::denied(
                self.caller_name(caller),
                capability.describe(),
                "in this organization",
            ))
        }
    }

    /// Non-administrative user names, sorted
    pub fn user_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .users
            .values()
            .filter(|u| !u.id.is_admin())
            .map(|u| u.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn group_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner.group_names.keys().cloned().collect();
        names.sort();
        names
    }
}
