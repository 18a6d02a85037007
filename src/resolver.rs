//! Effective access resolution
//!
//! The effective access of a principal on a backup is the maximum over:
//! - `Full` for administrators
//! - `Full` for the backup's owner
//! - the direct grant for `(backup, principal)`
//! - grants for `(backup, group)` for every group the principal belongs to
//! - enabled cluster share rules on the backup's cluster naming the
//!   principal or one of its groups
//!
//! Sources never mask each other: a lower direct grant does not hide a
//! higher group grant, in either order. Access is computed per backup uid;
//! nothing is inherited along an incremental chain.

use crate::catalog::BackupCatalog;
use crate::directory::PrincipalDirectory;
use crate::error::Result;
use crate::model::{
    AccessLevel, BackupObject, BackupUid, Caller, ClusterId, EffectiveAccess, GrantOrigin,
    PrincipalId,
};
use crate::store::GrantStore;
use std::sync::Arc;

/// Why a principal holds some level of access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    Admin,
    Owner,
    Direct,
    Group(PrincipalId),
    ClusterShare { cluster: ClusterId, via: PrincipalId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessExplanation {
    pub effective: EffectiveAccess,
    pub sources: Vec<(AccessSource, AccessLevel)>,
}

impl AccessExplanation {
    fn none() -> Self {
        AccessExplanation {
            effective: None,
            sources: Vec::new(),
        }
    }

    fn add(&mut self, source: AccessSource, level: AccessLevel) {
        self.effective = self.effective.max(Some(level));
        self.sources.push((source, level));
    }
}

pub struct AccessResolver {
    directory: Arc<PrincipalDirectory>,
    catalog: Arc<BackupCatalog>,
    store: Arc<dyn GrantStore>,
}

impl AccessResolver {
    pub fn new(
        directory: Arc<PrincipalDirectory>,
        catalog: Arc<BackupCatalog>,
        store: Arc<dyn GrantStore>,
    ) -> Self {
        AccessResolver {
            directory,
            catalog,
            store,
        }
    }

    /// `None` for deleted or unknown backups and for principals with no
    /// applicable source
    pub fn effective_access(&self, caller: &Caller, backup: &BackupUid) -> Result<EffectiveAccess> {
        Ok(self.explain(caller, backup)?.effective)
    }

    pub fn explain(&self, caller: &Caller, backup: &BackupUid) -> Result<AccessExplanation> {
        match self.catalog.backup(backup) {
            Some(object) if !object.state.is_deleted() => self.explain_object(caller, &object),
            _ => Ok(AccessExplanation::none()),
        }
    }

    /// Resolve against an already-fetched backup
    pub fn explain_object(&self, caller: &Caller, backup: &BackupObject) -> Result<AccessExplanation> {
        let mut explanation = AccessExplanation::none();
        if backup.state.is_deleted() {
            return Ok(explanation);
        }

        if caller.is_admin() {
            explanation.add(AccessSource::Admin, AccessLevel::Full);
            return Ok(explanation);
        }

        let principal = caller.principal_id();
        if backup.owner == principal {
            explanation.add(AccessSource::Owner, AccessLevel::Full);
        }

        let groups = match caller {
            Caller::User(id) => self.directory.groups_of(id),
            _ => Vec::new(),
        };

        for id in std::iter::once(&principal).chain(groups.iter()) {
            let grant = match self.store.grant(&backup.uid, id)? {
                Some(grant) => grant,
                None => continue,
            };
            // Rows fanned out from a cluster rule only count through the live
            // rule below, so a disabled rule stops granting immediately
            if grant.origin != GrantOrigin::Direct {
                continue;
            }
            let source = if id == &principal {
                AccessSource::Direct
            } else {
                AccessSource::Group(id.clone())
            };
            explanation.add(source, grant.level);
        }

        for rule in self.store.rules_for_cluster(&backup.cluster)? {
            if !rule.enabled {
                continue;
            }
            if rule.principal == principal || groups.contains(&rule.principal) {
                explanation.add(
                    AccessSource::ClusterShare {
                        cluster: rule.cluster.clone(),
                        via: rule.principal.clone(),
                    },
                    rule.level,
                );
            }
        }

        Ok(explanation)
    }

    pub fn effective_access_on(&self, caller: &Caller, backup: &BackupObject) -> Result<EffectiveAccess> {
        Ok(self.explain_object(caller, backup)?.effective)
    }
}
