//! Share propagation
//!
//! [`ShareEngine::share`] writes direct grants synchronously: when it
//! returns, every `(backup, principal)` pair it reported as succeeded is
//! visible to the resolver.
//!
//! Cluster shares are two-phase. [`ShareEngine::cluster_share`] upserts the
//! rules (which the resolver evaluates live) and queues a propagation job.
//! Running the job materializes cluster-origin grant rows for the cluster's
//! backups, or deletes them when the rule was disabled, then marks the
//! cluster's share status and invalidates affected listings. Jobs run from
//! [`ShareEngine::run_pending`], either driven by a caller polling
//! [`ShareEngine::wait_for_cluster_share`] or by a [`PropagationWorker`].

use crate::audit::{AuditAction, AuditLog, AuditOutcome};
use crate::catalog::BackupCatalog;
use crate::clock::Clock;
use crate::directory::PrincipalDirectory;
use crate::error::{AclError, Result};
use crate::gate::AuthorizationGate;
use crate::listing::ListingCache;
use crate::model::{
    AccessGrant, AccessLevel, BackupObject, BackupRef, BackupUid, Caller, ClusterId,
    ClusterShareRule, GrantOrigin, Principal, PrincipalId,
};
use crate::poll::{retry_with_timeout, Attempt};
use crate::pool::{BulkOutcome, WorkerPool};
use crate::resolver::AccessResolver;
use crate::store::GrantStore;
use crate::validation::require_principals;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress of the most recent cluster share change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareStatus {
    InProgress,
    Success,
    Failed(String),
}

#[derive(Debug, Clone)]
enum JobScope {
    /// Every live backup of the cluster
    Cluster,
    /// A single backup created after the rules were enabled
    Backup(BackupUid),
}

#[derive(Debug, Clone)]
struct PropagationJob {
    cluster: ClusterId,
    principals: Vec<PrincipalId>,
    scope: JobScope,
    requested_by: PrincipalId,
    not_before: DateTime<Utc>,
}

/// Shared handles the engine works against
pub struct ShareContext {
    pub directory: Arc<PrincipalDirectory>,
    pub catalog: Arc<BackupCatalog>,
    pub store: Arc<dyn GrantStore>,
    pub resolver: Arc<AccessResolver>,
    pub gate: Arc<AuthorizationGate>,
    pub listing: Arc<ListingCache>,
    pub audit: Arc<AuditLog>,
    pub clock: Arc<dyn Clock>,
}

pub struct ShareEngine {
    directory: Arc<PrincipalDirectory>,
    catalog: Arc<BackupCatalog>,
    store: Arc<dyn GrantStore>,
    resolver: Arc<AccessResolver>,
    gate: Arc<AuthorizationGate>,
    listing: Arc<ListingCache>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    pool: WorkerPool,
    delay: Duration,
    queue: Mutex<VecDeque<PropagationJob>>,
    status: RwLock<AHashMap<ClusterId, ShareStatus>>,
}

impl ShareEngine {
    pub fn new(context: ShareContext, pool: WorkerPool, delay: Duration) -> Self {
        ShareEngine {
            directory: context.directory,
            catalog: context.catalog,
            store: context.store,
            resolver: context.resolver,
            gate: context.gate,
            listing: context.listing,
            audit: context.audit,
            clock: context.clock,
            pool,
            delay,
            queue: Mutex::new(VecDeque::new()),
            status: RwLock::new(AHashMap::new()),
        }
    }

    /// Grant `level` on every referenced backup to every named group and
    /// user. Unknown principals fail the whole call before any write;
    /// per-backup failures are reported individually.
    pub fn share(
        &self,
        caller: &Caller,
        backups: &[BackupRef],
        groups: &[String],
        users: &[String],
        level: AccessLevel,
    ) -> Result<BulkOutcome<String>> {
        require_principals(groups, users)?;
        let targets = self.directory.resolve_principals(groups, users)?;

        let results = self
            .pool
            .run(backups, |reference| self.share_one(caller, reference, &targets, level));
        let outcome = BulkOutcome::from_results(backups.iter().map(|b| b.name.clone()), results);

        let affected = self.affected_users(targets.iter().map(|t| &t.id));
        self.listing.invalidate_many(affected.iter());

        if !outcome.is_complete() {
            warn!(
                "Share at {} completed for {}/{} backups: {}",
                level,
                outcome.succeeded.len(),
                outcome.total(),
                outcome.failure_summary()
            );
        }
        Ok(outcome)
    }

    fn share_one(
        &self,
        caller: &Caller,
        reference: &BackupRef,
        targets: &[Principal],
        level: AccessLevel,
    ) -> Result<usize> {
        let backup = self.gate.resolve_backup(caller, reference)?;
        self.require_sharer(caller, &backup, "share")?;

        let now = self.clock.now();
        let granter = caller.principal_id();
        let mut written = 0;
        for target in targets {
            let grant = AccessGrant::direct(
                backup.uid.clone(),
                target.id.clone(),
                level,
                granter.clone(),
                now,
            );
            if let Some(existing) = self.store.grant(&backup.uid, &target.id)? {
                if existing.same_effect(&grant) {
                    continue;
                }
            }
            self.store.put_grant(grant)?;
            written += 1;
        }

        info!(
            "Shared backup '{}' at {} with {} principals ({} written)",
            backup.name,
            level,
            targets.len(),
            written
        );
        self.audit.log(
            now,
            granter,
            AuditAction::Share,
            format!("backup [{}]", backup.name),
            AuditOutcome::Allowed,
        );
        Ok(written)
    }

    /// Remove direct grants on one backup. Cluster-derived access is
    /// controlled only through the cluster's rules.
    pub fn revoke(
        &self,
        caller: &Caller,
        reference: &BackupRef,
        groups: &[String],
        users: &[String],
    ) -> Result<usize> {
        require_principals(groups, users)?;
        let targets = self.directory.resolve_principals(groups, users)?;
        let backup = self.gate.resolve_backup(caller, reference)?;
        self.require_sharer(caller, &backup, "unshare")?;

        let mut removed = 0;
        for target in &targets {
            match self.store.grant(&backup.uid, &target.id)? {
                Some(grant) if grant.origin == GrantOrigin::Direct => {
                    self.store.remove_grant(&backup.uid, &target.id)?;
                    removed += 1;
                }
                _ => {}
            }
        }

        let affected = self.affected_users(targets.iter().map(|t| &t.id));
        self.listing.invalidate_many(affected.iter());

        info!("Revoked {} grants on backup '{}'", removed, backup.name);
        self.audit.log(
            self.clock.now(),
            caller.principal_id(),
            AuditAction::Revoke,
            format!("backup [{}]", backup.name),
            AuditOutcome::Allowed,
        );
        Ok(removed)
    }

    /// Only the owner or an administrator may change who sees a backup
    fn require_sharer(&self, caller: &Caller, backup: &BackupObject, action: &str) -> Result<()> {
        if caller.is_admin() || backup.owner == caller.principal_id() {
            return Ok(());
        }
        match self.resolver.effective_access_on(caller, backup)? {
            None => Err(AclError::not_found("backup", &backup.name)),
            Some(_) => Err(AclError::denied(
                self.directory.caller_name(caller),
                action,
                format!("backup [{}]", backup.name),
            )),
        }
    }

    /// Upsert (`enable = true`) or disable the cluster share rules for the
    /// named principals on the caller's cluster, then queue propagation
    pub fn cluster_share(
        &self,
        caller: &Caller,
        cluster_name: &str,
        groups: &[String],
        users: &[String],
        level: AccessLevel,
        enable: bool,
    ) -> Result<ClusterId> {
        require_principals(groups, users)?;
        let targets = self.directory.resolve_principals(groups, users)?;
        let requested_by = caller.principal_id();
        let cluster = self.catalog.cluster_uid(&requested_by, cluster_name)?;

        let now = self.clock.now();
        for target in &targets {
            self.store.put_rule(ClusterShareRule {
                cluster: cluster.clone(),
                principal: target.id.clone(),
                kind: target.kind,
                level,
                enabled: enable,
                updated_by: requested_by.clone(),
                updated_at: now,
            })?;
        }

        self.status
            .write()
            .insert(cluster.clone(), ShareStatus::InProgress);
        self.enqueue(PropagationJob {
            cluster: cluster.clone(),
            principals: targets.iter().map(|t| t.id.clone()).collect(),
            scope: JobScope::Cluster,
            requested_by: requested_by.clone(),
            not_before: self.due_at(now),
        });

        info!(
            "{} cluster share on '{}' at {} for {} principals",
            if enable { "Enabled" } else { "Disabled" },
            cluster_name,
            level,
            targets.len()
        );
        self.audit.log(
            now,
            requested_by,
            if enable {
                AuditAction::ClusterShare
            } else {
                AuditAction::ClusterUnshare
            },
            format!("cluster [{}]", cluster_name),
            AuditOutcome::Allowed,
        );
        Ok(cluster)
    }

    /// Queue materialization of enabled rules onto a newly created backup
    pub fn on_backup_created(&self, backup: &BackupObject) -> Result<()> {
        let principals: Vec<PrincipalId> = self
            .store
            .rules_for_cluster(&backup.cluster)?
            .into_iter()
            .filter(|r| r.enabled)
            .map(|r| r.principal)
            .collect();
        if principals.is_empty() {
            return Ok(());
        }

        debug!(
            "Backup '{}' created under shared cluster {}; queueing fan-out",
            backup.name, backup.cluster
        );
        self.enqueue(PropagationJob {
            cluster: backup.cluster.clone(),
            principals,
            scope: JobScope::Backup(backup.uid.clone()),
            requested_by: backup.owner.clone(),
            not_before: self.due_at(self.clock.now()),
        });
        Ok(())
    }

    fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.delay).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn enqueue(&self, job: PropagationJob) {
        self.queue.lock().push_back(job);
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued job that is due. Returns the number of jobs run.
    pub fn run_pending(&self) -> Result<usize> {
        let now = self.clock.now();
        let due: Vec<PropagationJob> = {
            let mut queue = self.queue.lock();
            let (due, waiting): (VecDeque<_>, VecDeque<_>) =
                queue.drain(..).partition(|job| job.not_before <= now);
            *queue = waiting;
            due.into_iter().collect()
        };

        let count = due.len();
        for job in due {
            self.apply(job)?;
        }
        Ok(count)
    }

    fn apply(&self, job: PropagationJob) -> Result<()> {
        let rules: Vec<ClusterShareRule> = self
            .store
            .rules_for_cluster(&job.cluster)?
            .into_iter()
            .filter(|r| job.principals.contains(&r.principal))
            .collect();

        let backups: Vec<BackupObject> = match &job.scope {
            JobScope::Cluster => self.catalog.backups_in_cluster(&job.cluster),
            JobScope::Backup(uid) => self
                .catalog
                .backup(uid)
                .filter(|b| !b.state.is_deleted())
                .into_iter()
                .collect(),
        };

        let now = self.clock.now();
        let results = self
            .pool
            .run(&backups, |backup| self.materialize(backup, &rules, &job.requested_by, now));
        let mut failures: Vec<String> = backups
            .iter()
            .zip(&results)
            .filter_map(|(b, r)| r.as_ref().err().map(|e| format!("{}: {}", b.name, e)))
            .collect();

        if let JobScope::Cluster = job.scope {
            for rule in rules.iter().filter(|r| !r.enabled) {
                match self.store.remove_cluster_grants(&job.cluster, &rule.principal) {
                    Ok(removed) => debug!(
                        "Removed {} cluster grants of {} on {}",
                        removed, rule.principal, job.cluster
                    ),
                    Err(e) => failures.push(format!("{}: {}", rule.principal, e)),
                }
            }

            let status = if failures.is_empty() {
                ShareStatus::Success
            } else {
                ShareStatus::Failed(failures.join("; "))
            };
            info!(
                "Cluster share propagation on {} over {} backups: {:?}",
                job.cluster,
                backups.len(),
                status
            );
            self.status.write().insert(job.cluster.clone(), status);
        } else if !failures.is_empty() {
            warn!("Fan-out to new backup failed: {}", failures.join("; "));
        }

        let affected = self.affected_users(job.principals.iter());
        self.listing.invalidate_many(affected.iter());
        Ok(())
    }

    /// Write cluster-origin rows for enabled rules. Direct grants are never
    /// overwritten.
    fn materialize(
        &self,
        backup: &BackupObject,
        rules: &[ClusterShareRule],
        granter: &PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut written = 0;
        for rule in rules.iter().filter(|r| r.enabled) {
            let grant = AccessGrant::from_cluster(
                backup.uid.clone(),
                rule.principal.clone(),
                rule.level,
                granter.clone(),
                now,
                backup.cluster.clone(),
            );
            if self.store.put_cluster_grant(grant)? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn status_of(&self, cluster: &ClusterId) -> Option<ShareStatus> {
        self.status.read().get(cluster).cloned()
    }

    /// Share status of a cluster in the caller's scope
    pub fn cluster_share_status(&self, caller: &Caller, cluster_name: &str) -> Result<ShareStatus> {
        let cluster = self.catalog.cluster_uid(&caller.principal_id(), cluster_name)?;
        self.status_of(&cluster)
            .ok_or_else(|| AclError::not_found("backup share status for cluster", cluster_name))
    }

    /// Poll until the cluster's share status is `Success`, running due
    /// propagation jobs on every attempt
    pub fn wait_for_cluster_share(
        &self,
        caller: &Caller,
        cluster_name: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        let cluster = self.catalog.cluster_uid(&caller.principal_id(), cluster_name)?;
        let what = format!("backup share of cluster [{}]", cluster_name);

        retry_with_timeout(self.clock.as_ref(), &what, timeout, interval, || {
            self.run_pending()?;
            match self.status_of(&cluster) {
                Some(ShareStatus::Success) => Ok(Attempt::Done(())),
                Some(ShareStatus::InProgress) => {
                    Ok(Attempt::Retry("share status is InProgress".to_string()))
                }
                Some(ShareStatus::Failed(reason)) => Err(AclError::Internal(format!(
                    "{} failed: {}",
                    what, reason
                ))),
                None => Err(AclError::not_found(
                    "backup share status for cluster",
                    cluster_name,
                )),
            }
        })
    }

    /// Drop the share status of a deleted cluster and any queued jobs for it
    pub fn forget_cluster(&self, cluster: &ClusterId) {
        self.status.write().remove(cluster);
        self.queue.lock().retain(|job| &job.cluster != cluster);
    }

    /// Users whose listings a change to `principals` can affect
    fn affected_users<'a>(&self, principals: impl IntoIterator<Item = &'a PrincipalId>) -> Vec<PrincipalId> {
        let mut users = BTreeSet::new();
        for id in principals {
            match self.directory.group(id) {
                Some(group) => users.extend(group.members.iter().cloned()),
                None => {
                    users.insert(id.clone());
                }
            }
        }
        users.into_iter().collect()
    }
}

/// Background thread that periodically runs due propagation jobs
pub struct PropagationWorker {
    handle: Option<JoinHandle<()>>,
    interval: Duration,
    running: Arc<Mutex<bool>>,
}

impl PropagationWorker {
    pub fn new(interval: Duration) -> Self {
        PropagationWorker {
            handle: None,
            interval,
            running: Arc::new(Mutex::new(false)),
        }
    }

    pub fn start(&mut self, engine: Arc<ShareEngine>) {
        if self.is_running() {
            return;
        }
        *self.running.lock() = true;

        let interval = self.interval;
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            while *running.lock() {
                thread::sleep(interval);

                match engine.run_pending() {
                    Ok(0) => {}
                    Ok(n) => debug!("Propagation worker ran {} jobs", n),
                    Err(e) => warn!("Propagation worker failed: {}", e),
                }
            }
        });

        info!("Started propagation worker (interval {:?})", interval);
        self.handle = Some(handle);
    }

    pub fn stop(&mut self) {
        *self.running.lock() = false;

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }
}

impl Drop for PropagationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
