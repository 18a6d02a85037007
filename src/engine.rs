//! Engine facade
//!
//! [`AccessEngine`] wires the directory, catalog, grant store, resolver,
//! gate, share engine and ownership manager together and exposes the
//! operations callers use. Every backup operation goes through the gate
//! before it takes effect.

use crate::audit::{AuditAction, AuditEvent, AuditLog, AuditOutcome};
use crate::catalog::BackupCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, GrantStoreConfig};
use crate::directory::PrincipalDirectory;
use crate::error::{AclError, Result};
use crate::gate::AuthorizationGate;
use crate::listing::{ListedBackup, ListingCache};
use crate::model::{
    AccessLevel, AuxKind, BackupObject, BackupRef, BackupSpec, BackupUid, Caller, Capability,
    ClusterId, CollaboratorAccess, EffectiveAccess, LifecycleState, Operation, OwnershipUpdate,
    PrincipalId, RestoreObject, Role,
};
use crate::ownership::OwnershipManager;
use crate::poll::{retry_with_timeout, Attempt};
use crate::pool::{BulkOutcome, WorkerPool};
use crate::propagation::{PropagationWorker, ShareContext, ShareEngine, ShareStatus};
use crate::resolver::{AccessExplanation, AccessResolver};
use crate::store::{self, GrantStore};
use crate::validation::validate_name;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builder for [`AccessEngine`]
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn GrantStore>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            config: EngineConfig::default(),
            clock: None,
            store: None,
        }
    }

    /// Start from a loaded configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn org_id<S: Into<String>>(mut self, org_id: S) -> Self {
        self.config.org_id = org_id.into();
        self
    }

    pub fn admin_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.admin_name = name.into();
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    pub fn listing_ttl(mut self, ttl: Duration) -> Self {
        self.config.listing_ttl_secs = ttl.as_secs();
        self
    }

    pub fn propagation_delay(mut self, delay: Duration) -> Self {
        self.config.propagation_delay_secs = delay.as_secs();
        self
    }

    /// Persist grants to a SQLite database at `path`
    pub fn sqlite<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.grant_store = GrantStoreConfig::Sqlite { path: path.into() };
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an already-open grant store instead of the configured backend
    pub fn with_grant_store(mut self, store: Arc<dyn GrantStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<AccessEngine> {
        use validator::Validate;
        self.config.validate()?;

        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = match self.store {
            Some(store) => store,
            None => store::open(&config.grant_store)?,
        };

        info!(
            "Building access engine for org '{}' ({} workers, listing TTL {}s)",
            config.org_id, config.worker_pool_size, config.listing_ttl_secs
        );

        let directory = Arc::new(PrincipalDirectory::new(&config.admin_name));
        let catalog = Arc::new(BackupCatalog::new());
        let audit = Arc::new(AuditLog::new(config.audit_capacity));
        let listing = Arc::new(ListingCache::new(
            config.listing_cache_capacity,
            config.listing_ttl(),
            clock.clone(),
        ));
        let resolver = Arc::new(AccessResolver::new(
            directory.clone(),
            catalog.clone(),
            store.clone(),
        ));
        let gate = Arc::new(AuthorizationGate::new(
            directory.clone(),
            catalog.clone(),
            resolver.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let pool = WorkerPool::new(config.worker_pool_size);
        let shares = Arc::new(ShareEngine::new(
            ShareContext {
                directory: directory.clone(),
                catalog: catalog.clone(),
                store: store.clone(),
                resolver: resolver.clone(),
                gate: gate.clone(),
                listing: listing.clone(),
                audit: audit.clone(),
                clock: clock.clone(),
            },
            pool,
            config.propagation_delay(),
        ));
        let ownership = Arc::new(OwnershipManager::new(directory.clone()));
        let worker = Mutex::new(PropagationWorker::new(config.share_status_interval()));

        Ok(AccessEngine {
            config,
            clock,
            directory,
            catalog,
            store,
            resolver,
            gate,
            shares,
            ownership,
            listing,
            audit,
            pool,
            worker,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AccessEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    directory: Arc<PrincipalDirectory>,
    catalog: Arc<BackupCatalog>,
    store: Arc<dyn GrantStore>,
    resolver: Arc<AccessResolver>,
    gate: Arc<AuthorizationGate>,
    shares: Arc<ShareEngine>,
    ownership: Arc<OwnershipManager>,
    listing: Arc<ListingCache>,
    audit: Arc<AuditLog>,
    pool: WorkerPool,
    worker: Mutex<PropagationWorker>,
}

impl AccessEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with default configuration and the in-memory grant store
    pub fn in_memory() -> Result<Self> {
        EngineBuilder::new().build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn directory(&self) -> &PrincipalDirectory {
        &self.directory
    }

    pub fn grant_store(&self) -> &Arc<dyn GrantStore> {
        &self.store
    }

    // ----- principals -----

    /// Caller context for a directory user; the administrative user maps to
    /// [`Caller::Admin`]
    pub fn caller_for(&self, user: &str) -> Result<Caller> {
        let id = self.directory.user_id(user)?;
        if id.is_admin() {
            Ok(Caller::Admin)
        } else {
            Ok(Caller::User(id))
        }
    }

    pub fn add_user(&self, name: &str, first_name: &str, last_name: &str, email: &str) -> Result<PrincipalId> {
        self.directory.add_user(name, first_name, last_name, email)
    }

    /// Create many users through the worker pool
    pub fn add_users(&self, names: &[String]) -> BulkOutcome<String> {
        let results = self.pool.run(names, |name| {
            self.directory
                .add_user(name, name, "user", &format!("{}@{}.local", name, self.config.org_id))
        });
        BulkOutcome::from_results(names.iter().cloned(), results)
    }

    /// Delete a user without destroying anything it owned: its backups stay
    /// addressable by administrators, its auxiliary objects move to the
    /// administrator, and grants and rules naming it are dropped
    pub fn delete_user(&self, name: &str) -> Result<()> {
        let user = self.directory.delete_user(name)?;
        let orphaned = self.catalog.mark_orphaned(&user.id);
        let reassigned = self.ownership.handle_owner_deleted(&user.id);
        let grants = self.store.remove_grants_for_principal(&user.id)?;
        let rules = self.store.remove_rules_for_principal(&user.id)?;
        self.listing.invalidate(&user.id);

        info!(
            "Cleaned up after user '{}': {} orphaned backups, {} reassigned objects, {} grants, {} rules",
            name,
            orphaned.len(),
            reassigned,
            grants,
            rules
        );
        Ok(())
    }

    pub fn delete_users(&self, names: &[String]) -> BulkOutcome<String> {
        let results = self.pool.run(names, |name| self.delete_user(name));
        BulkOutcome::from_results(names.iter().cloned(), results)
    }

    pub fn add_group(&self, name: &str) -> Result<PrincipalId> {
        self.directory.add_group(name)
    }

    pub fn add_groups(&self, names: &[String]) -> BulkOutcome<String> {
        let results = self.pool.run(names, |name| self.directory.add_group(name));
        BulkOutcome::from_results(names.iter().cloned(), results)
    }

    /// Delete a group as a grant source. Grants made to its former members
    /// individually are untouched.
    pub fn delete_group(&self, name: &str) -> Result<()> {
        let group = self.directory.delete_group(name)?;
        let grants = self.store.remove_grants_for_principal(&group.id)?;
        let rules = self.store.remove_rules_for_principal(&group.id)?;
        self.ownership.strip_principal(&group.id);
        self.listing.invalidate_many(group.members.iter());

        info!(
            "Cleaned up after group '{}': {} grants, {} rules",
            name, grants, rules
        );
        Ok(())
    }

    pub fn delete_groups(&self, names: &[String]) -> BulkOutcome<String> {
        let results = self.pool.run(names, |name| self.delete_group(name));
        BulkOutcome::from_results(names.iter().cloned(), results)
    }

    pub fn add_user_to_group(&self, user: &str, group: &str) -> Result<()> {
        self.directory.add_user_to_group(user, group)?;
        self.listing.invalidate(&self.directory.user_id(user)?);
        Ok(())
    }

    pub fn remove_user_from_group(&self, user: &str, group: &str) -> Result<()> {
        self.directory.remove_user_from_group(user, group)?;
        self.listing.invalidate(&self.directory.user_id(user)?);
        Ok(())
    }

    pub fn members_of_group(&self, group: &str) -> Result<Vec<String>> {
        self.directory.members_of_group(group)
    }

    pub fn random_user_from_group(&self, group: &str) -> Result<String> {
        self.directory.random_user_from_group(group)
    }

    pub fn user_id(&self, name: &str) -> Result<PrincipalId> {
        self.directory.user_id(name)
    }

    pub fn group_id(&self, name: &str) -> Result<PrincipalId> {
        self.directory.group_id(name)
    }

    pub fn add_role_to_user(&self, user: &str, role: Role, reason: &str) -> Result<()> {
        self.directory.add_role_to_user(user, role, reason)
    }

    pub fn delete_role_from_user(&self, user: &str, role: Role, reason: &str) -> Result<()> {
        self.directory.delete_role_from_user(user, role, reason)
    }

    pub fn add_role_to_group(&self, group: &str, role: Role, reason: &str) -> Result<()> {
        self.directory.add_role_to_group(group, role, reason)
    }

    pub fn delete_role_from_group(&self, group: &str, role: Role, reason: &str) -> Result<()> {
        self.directory.delete_role_from_group(group, role, reason)
    }

    pub fn roles_of_user(&self, user: &str) -> Result<BTreeSet<Role>> {
        self.directory.roles_of_user(user)
    }

    // ----- clusters -----

    pub fn register_cluster(&self, caller: &Caller, name: &str) -> Result<ClusterId> {
        let name = validate_name(name)?;
        self.directory
            .require_capability(caller, Capability::RegisterCluster)?;
        self.catalog.register_cluster(
            &caller.principal_id(),
            &name,
            &self.config.org_id,
            self.clock.now(),
        )
    }

    pub fn cluster_uid(&self, caller: &Caller, name: &str) -> Result<ClusterId> {
        self.catalog.cluster_uid(&caller.principal_id(), name)
    }

    /// Remove a cluster registration and its share rules. Backups taken
    /// from it are kept.
    pub fn delete_cluster(&self, caller: &Caller, name: &str) -> Result<()> {
        let cluster = self.catalog.delete_cluster(&caller.principal_id(), name)?;
        let rules = self.store.remove_rules_for_cluster(&cluster.uid)?;
        self.shares.forget_cluster(&cluster.uid);
        self.listing.clear();
        debug!("Dropped {} share rules with cluster '{}'", rules, name);
        Ok(())
    }

    // ----- backups -----

    pub fn create_backup(&self, caller: &Caller, spec: BackupSpec) -> Result<BackupUid> {
        self.directory
            .require_capability(caller, Capability::CreateBackup)?;
        let name = validate_name(&spec.name)?;
        if !matches!(
            spec.initial_state,
            LifecycleState::Creating | LifecycleState::Active
        ) {
            return Err(AclError::InvalidArgument(format!(
                "backup [{}] cannot be created in state {}",
                name, spec.initial_state
            )));
        }

        let owner = caller.principal_id();
        let cluster = self.catalog.cluster_uid(&owner, &spec.cluster)?;

        if let Some(location) = &spec.location {
            self.ownership
                .check(caller, AuxKind::BackupLocation, location, CollaboratorAccess::Write)?;
        }
        if let Some(policy) = &spec.schedule_policy {
            self.ownership
                .check(caller, AuxKind::SchedulePolicy, policy, CollaboratorAccess::Write)?;
        }
        for rule in spec.pre_rule.iter().chain(spec.post_rule.iter()) {
            self.ownership
                .check(caller, AuxKind::Rule, rule, CollaboratorAccess::Write)?;
        }
        let parent = match &spec.parent {
            Some(parent) => Some(
                self.gate
                    .authorize(caller, &BackupRef::named(parent.as_str()), Operation::View)?
                    .uid,
            ),
            None => None,
        };

        let backup = BackupObject {
            uid: BackupUid::generate(),
            name,
            owner: owner.clone(),
            cluster,
            org_id: self.config.org_id.clone(),
            location: spec.location,
            parent,
            state: spec.initial_state,
            created_at: self.clock.now(),
            orphaned: false,
        };
        self.catalog.insert_backup(backup.clone())?;
        self.shares.on_backup_created(&backup)?;
        self.listing.invalidate(&owner);

        info!("Created backup '{}' ({}) for {}", backup.name, backup.uid, owner);
        Ok(backup.uid)
    }

    /// Uid of a backup visible to the caller
    pub fn backup_uid(&self, caller: &Caller, name: &str) -> Result<BackupUid> {
        Ok(self
            .gate
            .authorize(caller, &BackupRef::named(name), Operation::View)?
            .uid)
    }

    pub fn inspect_backup(&self, caller: &Caller, reference: &BackupRef) -> Result<BackupObject> {
        self.gate.authorize(caller, reference, Operation::View)
    }

    /// Lifecycle input from the external sync process
    pub fn set_lifecycle(&self, uid: &BackupUid, state: LifecycleState) -> Result<()> {
        self.catalog.set_state(uid, state)?;
        if state.is_deleted() {
            self.cascade_deleted(uid)?;
        } else {
            self.listing.clear();
        }
        Ok(())
    }

    /// Request deletion. Concurrent requests from several callers with full
    /// access all succeed; the backup stays in `DeletePending` until the
    /// deletion completes.
    pub fn delete_backup(&self, caller: &Caller, reference: &BackupRef) -> Result<()> {
        let backup = self.gate.authorize(caller, reference, Operation::Delete)?;
        let started = self.catalog.request_deletion(&backup.uid)?;

        if started {
            self.listing.clear();
            info!("Deletion of backup '{}' ({}) requested", backup.name, backup.uid);
        } else {
            debug!("Deletion of backup '{}' already under way", backup.name);
        }
        self.audit.log(
            self.clock.now(),
            caller.principal_id(),
            AuditAction::DeleteBackup,
            format!("backup [{}]", backup.name),
            AuditOutcome::Allowed,
        );
        Ok(())
    }

    /// Finish a pending deletion and drop every grant on the backup
    pub fn complete_deletion(&self, uid: &BackupUid) -> Result<()> {
        let backup = self
            .catalog
            .backup(uid)
            .ok_or_else(|| AclError::not_found("backup", uid))?;

        match backup.state {
            LifecycleState::Deleted => return Ok(()),
            LifecycleState::DeletePending => {
                self.catalog.set_state(uid, LifecycleState::Deleting)?;
            }
            LifecycleState::Deleting => {}
            other => {
                return Err(AclError::InvalidArgument(format!(
                    "backup [{}] is {} and has no pending deletion",
                    backup.name, other
                )))
            }
        }

        self.catalog.set_state(uid, LifecycleState::Deleted)?;
        self.cascade_deleted(uid)
    }

    fn cascade_deleted(&self, uid: &BackupUid) -> Result<()> {
        let removed = self.store.remove_grants_for_object(uid)?;
        self.listing.clear();
        debug!("Backup {} deleted; removed {} grants", uid, removed);
        Ok(())
    }

    /// Restore a backup onto a cluster registered by the caller
    pub fn create_restore(
        &self,
        caller: &Caller,
        restore_name: &str,
        backup: &BackupRef,
        target_cluster: &str,
    ) -> Result<()> {
        self.directory
            .require_capability(caller, Capability::CreateRestore)?;
        let name = validate_name(restore_name)?;
        let source = self.gate.authorize(caller, backup, Operation::Restore)?;
        if source.state != LifecycleState::Active {
            return Err(AclError::InvalidArgument(format!(
                "backup [{}] is {} and cannot be restored",
                source.name, source.state
            )));
        }

        let owner = caller.principal_id();
        let target = self.catalog.cluster_uid(&owner, target_cluster)?;
        self.catalog.insert_restore(RestoreObject {
            name: name.clone(),
            backup: source.uid.clone(),
            target_cluster: target,
            owner,
            created_at: self.clock.now(),
        })?;

        info!(
            "Created restore '{}' from backup '{}' onto '{}'",
            name, source.name, target_cluster
        );
        Ok(())
    }

    /// Owners delete their own restores; administrators may delete any
    pub fn delete_restore(&self, caller: &Caller, name: &str) -> Result<()> {
        let owner = caller.principal_id();
        let restore = match self.catalog.restore(&owner, name) {
            Some(restore) => restore,
            None if caller.is_admin() => self
                .catalog
                .restores_named(name)
                .into_iter()
                .next()
                .ok_or_else(|| AclError::not_found("restore", name))?,
            None => return Err(AclError::not_found("restore", name)),
        };

        self.catalog.remove_restore(&restore.owner, name)?;
        self.audit.log(
            self.clock.now(),
            owner,
            AuditAction::DeleteRestore,
            format!("restore [{}]", name),
            AuditOutcome::Allowed,
        );
        info!("Deleted restore '{}'", name);
        Ok(())
    }

    /// Copy a backup's definition into a new backup owned by the caller.
    /// Needs full access and the source cluster registered by the caller.
    pub fn duplicate_backup(&self, caller: &Caller, reference: &BackupRef, new_name: &str) -> Result<BackupUid> {
        let source = self.gate.authorize_duplicate(caller, reference)?;
        let cluster = self
            .catalog
            .cluster(&source.cluster)
            .ok_or_else(|| AclError::not_found("cluster", &source.cluster))?;

        let mut spec = BackupSpec::new(new_name, cluster.name);
        spec.location = source.location.clone();
        self.create_backup(caller, spec)
    }

    pub fn transfer_backup_ownership(&self, caller: &Caller, reference: &BackupRef, new_owner: &str) -> Result<()> {
        let backup = self.gate.resolve_backup(caller, reference)?;
        if !caller.is_admin() && backup.owner != caller.principal_id() {
            return match self.resolver.effective_access_on(caller, &backup)? {
                None => Err(AclError::not_found("backup", &backup.name)),
                Some(_) => Err(AclError::denied(
                    self.directory.caller_name(caller),
                    "transfer ownership of",
                    format!("backup [{}]", backup.name),
                )),
            };
        }

        let new_owner_id = self.directory.user_id(new_owner)?;
        let previous = self.catalog.set_owner(&backup.uid, new_owner_id.clone())?;
        self.listing.invalidate_many([&previous, &new_owner_id]);

        self.audit.log(
            self.clock.now(),
            caller.principal_id(),
            AuditAction::TransferOwnership,
            format!("backup [{}]", backup.name),
            AuditOutcome::Allowed,
        );
        info!(
            "Transferred backup '{}' from {} to '{}'",
            backup.name, previous, new_owner
        );
        Ok(())
    }

    // ----- sharing -----

    pub fn share_backup(
        &self,
        caller: &Caller,
        backup: &str,
        groups: &[String],
        users: &[String],
        level: AccessLevel,
    ) -> Result<()> {
        self.shares
            .share(caller, &[BackupRef::named(backup)], groups, users, level)?
            .into_result()
            .map(|_| ())
    }

    /// Share many backups at once; each backup's outcome is reported
    pub fn share_backups(
        &self,
        caller: &Caller,
        backups: &[BackupRef],
        groups: &[String],
        users: &[String],
        level: AccessLevel,
    ) -> Result<BulkOutcome<String>> {
        self.shares.share(caller, backups, groups, users, level)
    }

    pub fn revoke_backup_share(
        &self,
        caller: &Caller,
        backup: &str,
        groups: &[String],
        users: &[String],
    ) -> Result<()> {
        self.shares
            .revoke(caller, &BackupRef::named(backup), groups, users)
            .map(|_| ())
    }

    pub fn cluster_update_backup_share(
        &self,
        caller: &Caller,
        cluster: &str,
        groups: &[String],
        users: &[String],
        level: AccessLevel,
        enable: bool,
    ) -> Result<()> {
        self.shares
            .cluster_share(caller, cluster, groups, users, level, enable)
            .map(|_| ())
    }

    pub fn cluster_share_status(&self, caller: &Caller, cluster: &str) -> Result<ShareStatus> {
        self.shares.cluster_share_status(caller, cluster)
    }

    /// Wait for a cluster share change using the configured timeout and
    /// interval
    pub fn wait_for_cluster_share(&self, caller: &Caller, cluster: &str) -> Result<()> {
        self.shares.wait_for_cluster_share(
            caller,
            cluster,
            self.config.share_status_timeout(),
            self.config.share_status_interval(),
        )
    }

    pub fn wait_for_cluster_share_with(
        &self,
        caller: &Caller,
        cluster: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        self.shares
            .wait_for_cluster_share(caller, cluster, timeout, interval)
    }

    pub fn run_pending_propagation(&self) -> Result<usize> {
        self.shares.run_pending()
    }

    /// Run due propagation jobs in the background every `interval`
    pub fn start_propagation_worker(&self, interval: Duration) {
        let mut worker = self.worker.lock();
        worker.stop();
        *worker = PropagationWorker::new(interval);
        worker.start(self.shares.clone());
    }

    pub fn stop_propagation_worker(&self) {
        self.worker.lock().stop();
    }

    // ----- auxiliary objects -----

    pub fn create_auxiliary(&self, caller: &Caller, kind: AuxKind, name: &str) -> Result<String> {
        self.ownership.create(caller, kind, name, self.clock.now())
    }

    pub fn update_ownership(&self, caller: &Caller, kind: AuxKind, name: &str, update: &OwnershipUpdate) -> Result<()> {
        self.ownership.update_ownership(caller, kind, name, update)?;
        self.audit.log(
            self.clock.now(),
            caller.principal_id(),
            AuditAction::UpdateOwnership,
            format!("{} [{}]", kind, name),
            AuditOutcome::Allowed,
        );
        Ok(())
    }

    pub fn update_backup_location_ownership(
        &self,
        caller: &Caller,
        name: &str,
        users: &[String],
        groups: &[String],
        access: CollaboratorAccess,
        inverse_access: CollaboratorAccess,
    ) -> Result<()> {
        let update = OwnershipUpdate::new(access)
            .users(users.iter().cloned())
            .groups(groups.iter().cloned())
            .public(inverse_access);
        self.update_ownership(caller, AuxKind::BackupLocation, name, &update)
    }

    pub fn update_schedule_policy_ownership(
        &self,
        caller: &Caller,
        name: &str,
        users: &[String],
        groups: &[String],
        access: CollaboratorAccess,
        inverse_access: CollaboratorAccess,
    ) -> Result<()> {
        let update = OwnershipUpdate::new(access)
            .users(users.iter().cloned())
            .groups(groups.iter().cloned())
            .public(inverse_access);
        self.update_ownership(caller, AuxKind::SchedulePolicy, name, &update)
    }

    pub fn update_rule_ownership(
        &self,
        caller: &Caller,
        name: &str,
        users: &[String],
        groups: &[String],
        access: CollaboratorAccess,
        inverse_access: CollaboratorAccess,
    ) -> Result<()> {
        let update = OwnershipUpdate::new(access)
            .users(users.iter().cloned())
            .groups(groups.iter().cloned())
            .public(inverse_access);
        self.update_ownership(caller, AuxKind::Rule, name, &update)
    }

    pub fn check_auxiliary(&self, caller: &Caller, kind: AuxKind, name: &str, need: CollaboratorAccess) -> Result<()> {
        self.ownership.check(caller, kind, name, need)
    }

    pub fn list_auxiliary(&self, caller: &Caller, kind: AuxKind) -> Vec<String> {
        self.ownership.list(caller, kind)
    }

    pub fn transfer_auxiliary_ownership(&self, caller: &Caller, kind: AuxKind, name: &str, new_owner: &str) -> Result<()> {
        self.ownership.transfer_ownership(caller, kind, name, new_owner)
    }

    pub fn delete_auxiliary(&self, caller: &Caller, kind: AuxKind, name: &str) -> Result<()> {
        self.ownership.delete(caller, kind, name)
    }

    // ----- access queries -----

    /// Effective access on the referenced backup; `None` when the caller
    /// cannot see it at all
    pub fn effective_access(&self, caller: &Caller, reference: &BackupRef) -> Result<EffectiveAccess> {
        match self.gate.resolve_backup(caller, reference) {
            Ok(backup) => self.resolver.effective_access_on(caller, &backup),
            Err(AclError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn explain_access(&self, caller: &Caller, reference: &BackupRef) -> Result<AccessExplanation> {
        let backup = self.gate.resolve_backup(caller, reference)?;
        self.resolver.explain_object(caller, &backup)
    }

    pub fn authorize(&self, caller: &Caller, reference: &BackupRef, op: Operation) -> Result<BackupObject> {
        self.gate.authorize(caller, reference, op)
    }

    // ----- listing -----

    /// Backups the caller can see, served from the listing cache
    pub fn listed_backups(&self, caller: &Caller) -> Result<Vec<ListedBackup>> {
        self.listing
            .get_or_compute(&caller.principal_id(), || self.compute_listing(caller))
    }

    fn compute_listing(&self, caller: &Caller) -> Result<Vec<ListedBackup>> {
        let mut rows = Vec::new();
        for backup in self.catalog.all_backups() {
            if self.resolver.effective_access_on(caller, &backup)?.is_some() {
                rows.push(ListedBackup {
                    uid: backup.uid,
                    name: backup.name,
                    state: backup.state,
                });
            }
        }
        Ok(rows)
    }

    pub fn backups_for(&self, caller: &Caller) -> Result<Vec<String>> {
        Ok(self
            .listed_backups(caller)?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    /// Listing as seen by the named user
    pub fn backups_for_user(&self, user: &str) -> Result<Vec<String>> {
        let caller = self.caller_for(user)?;
        self.backups_for(&caller)
    }

    /// Every backup not yet deleted, bypassing the cache
    pub fn all_backups_admin(&self) -> Vec<String> {
        self.catalog
            .all_backups()
            .into_iter()
            .map(|b| b.name)
            .collect()
    }

    pub fn invalidate_listing(&self, caller: &Caller) {
        self.listing.invalidate(&caller.principal_id());
    }

    /// True when none of `names` (or, if empty, nothing at all) is still
    /// listed for the caller, except backups whose deletion is under way
    pub fn revocation_settled(&self, caller: &Caller, names: &[&str]) -> Result<bool> {
        Ok(self.lingering(caller, names)?.is_empty())
    }

    fn lingering(&self, caller: &Caller, names: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .listed_backups(caller)?
            .into_iter()
            .filter(|b| names.is_empty() || names.contains(&b.name.as_str()))
            .filter(|b| !b.state.is_deleting())
            .map(|b| b.name)
            .collect())
    }

    /// Poll until revocation settles, running due propagation each attempt
    pub fn wait_for_revocation(&self, caller: &Caller, names: &[&str], timeout: Duration, interval: Duration) -> Result<()> {
        retry_with_timeout(self.clock.as_ref(), "revocation", timeout, interval, || {
            self.shares.run_pending()?;
            let lingering = self.lingering(caller, names)?;
            if lingering.is_empty() {
                Ok(Attempt::Done(()))
            } else {
                Ok(Attempt::Retry(format!("still listed: {}", lingering.join(", "))))
            }
        })
    }

    /// Poll until every backup in `names` is listed for the caller
    pub fn wait_for_visibility(&self, caller: &Caller, names: &[&str], timeout: Duration, interval: Duration) -> Result<()> {
        retry_with_timeout(self.clock.as_ref(), "visibility", timeout, interval, || {
            self.shares.run_pending()?;
            let listed = self.backups_for(caller)?;
            let missing: Vec<&str> = names
                .iter()
                .copied()
                .filter(|n| !listed.iter().any(|l| l == n))
                .collect();
            if missing.is_empty() {
                Ok(Attempt::Done(()))
            } else {
                Ok(Attempt::Retry(format!("not yet listed: {}", missing.join(", "))))
            }
        })
    }

    // ----- audit -----

    pub fn recent_audit(&self, n: usize) -> Vec<AuditEvent> {
        self.audit.recent(n)
    }

    pub fn audit_denials(&self) -> Vec<AuditEvent> {
        self.audit.denials()
    }
}

impl Drop for AccessEngine {
    fn drop(&mut self) {
        self.worker.lock().stop();
    }
}
