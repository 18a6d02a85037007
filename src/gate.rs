//! Authorization gate in front of every backup operation
//!
//! Two failure shapes, kept distinct so callers can tell them apart by
//! message:
//! - no effective access at all, or no such backup: NotFound
//! - some access, but below what the operation needs: PermissionDenied

use crate::audit::{AuditAction, AuditLog, AuditOutcome};
use crate::catalog::BackupCatalog;
use crate::clock::Clock;
use crate::directory::PrincipalDirectory;
use crate::error::{AclError, Result};
use crate::model::{BackupObject, BackupRef, Caller, Operation};
use crate::resolver::AccessResolver;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AuthorizationGate {
    directory: Arc<PrincipalDirectory>,
    catalog: Arc<BackupCatalog>,
    resolver: Arc<AccessResolver>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationGate {
    pub fn new(
        directory: Arc<PrincipalDirectory>,
        catalog: Arc<BackupCatalog>,
        resolver: Arc<AccessResolver>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AuthorizationGate {
            directory,
            catalog,
            resolver,
            audit,
            clock,
        }
    }

    /// Find the backup `reference` names in `caller`'s scope.
    ///
    /// A pinned uid wins. Otherwise the caller's own backup of that name is
    /// preferred, then the oldest same-named backup the caller can see.
    pub fn resolve_backup(&self, caller: &Caller, reference: &BackupRef) -> Result<BackupObject> {
        if let Some(uid) = &reference.uid {
            return match self.catalog.backup(uid) {
                Some(backup) if backup.name == reference.name && !backup.state.is_deleted() => {
                    Ok(backup)
                }
                _ => Err(AclError::not_found("backup", &reference.name)),
            };
        }

        let principal = caller.principal_id();
        if let Some(backup) = self.catalog.owned_backup_named(&principal, &reference.name) {
            return Ok(backup);
        }

        for backup in self.catalog.backups_named(&reference.name) {
            if self.resolver.effective_access_on(caller, &backup)?.is_some() {
                return Ok(backup);
            }
        }

        Err(AclError::not_found("backup", &reference.name))
    }

    /// Check `caller` may perform `op` on the referenced backup
    pub fn authorize(&self, caller: &Caller, reference: &BackupRef, op: Operation) -> Result<BackupObject> {
        let backup = self.resolve_backup(caller, reference)?;
        let access = self.resolver.effective_access_on(caller, &backup)?;

        match access {
            None => {
                // Outside the caller's visibility scope
                Err(AclError::not_found("backup", &backup.name))
            }
            Some(level) if level.permits(op) => {
                debug!(
                    "Authorized {} of backup '{}' for {} ({})",
                    op.verb(),
                    backup.name,
                    caller.principal_id(),
                    level
                );
                Ok(backup)
            }
            Some(level) => {
                let principal = self.directory.caller_name(caller);
                let target = format!("backup [{}]", backup.name);
                warn!(
                    "Denied {} of {} for {}: holds {}, needs {}",
                    op.verb(),
                    target,
                    principal,
                    level,
                    op.required_level()
                );
                self.audit.log(
                    self.clock.now(),
                    caller.principal_id(),
                    AuditAction::Authorize,
                    target.clone(),
                    AuditOutcome::Denied(format!("{} below {}", level, op.required_level())),
                );
                Err(AclError::denied(principal, op.verb(), target))
            }
        }
    }

    /// Duplication also needs the source cluster registered in the
    /// caller's own scope
    pub fn authorize_duplicate(&self, caller: &Caller, reference: &BackupRef) -> Result<BackupObject> {
        let backup = self.authorize(caller, reference, Operation::Duplicate)?;
        let cluster = self
            .catalog
            .cluster(&backup.cluster)
            .ok_or_else(|| AclError::not_found("cluster", &backup.cluster))?;
        self.catalog.cluster_uid(&caller.principal_id(), &cluster.name)?;
        Ok(backup)
    }
}
