//! Grant storage
//!
//! Grants are keyed by `(object, principal)` and cluster share rules by
//! `(cluster, principal)`. Each write is atomic on its own; bulk callers
//! fan out one write per pair.

mod memory;
mod sqlite;

pub use memory::MemoryGrantStore;
pub use sqlite::SqliteGrantStore;

use crate::config::GrantStoreConfig;
use crate::error::Result;
use crate::model::{AccessGrant, BackupUid, ClusterId, ClusterShareRule, PrincipalId};
use std::sync::Arc;

pub trait GrantStore: Send + Sync {
    /// Insert or overwrite the grant for its `(object, principal)` pair,
    /// returning the row it replaced
    fn put_grant(&self, grant: AccessGrant) -> Result<Option<AccessGrant>>;

    /// Write a cluster-origin grant unless the pair already holds a direct
    /// grant or the same effect. The check and the write are one atomic
    /// step. Returns whether a row was written.
    fn put_cluster_grant(&self, grant: AccessGrant) -> Result<bool>;

    fn grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<Option<AccessGrant>>;

    fn grants_for_object(&self, object: &BackupUid) -> Result<Vec<AccessGrant>>;

    fn grants_for_principal(&self, principal: &PrincipalId) -> Result<Vec<AccessGrant>>;

    fn remove_grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<bool>;

    /// Remove every grant fanned out from `cluster`'s rule for `principal`
    fn remove_cluster_grants(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<usize>;

    fn remove_grants_for_object(&self, object: &BackupUid) -> Result<usize>;

    fn remove_grants_for_principal(&self, principal: &PrincipalId) -> Result<usize>;

    /// Insert or overwrite the rule for its `(cluster, principal)` pair
    fn put_rule(&self, rule: ClusterShareRule) -> Result<()>;

    fn rule(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<Option<ClusterShareRule>>;

    fn rules_for_cluster(&self, cluster: &ClusterId) -> Result<Vec<ClusterShareRule>>;

    fn remove_rules_for_principal(&self, principal: &PrincipalId) -> Result<usize>;

    fn remove_rules_for_cluster(&self, cluster: &ClusterId) -> Result<usize>;

    fn grant_count(&self) -> Result<usize>;
}

/// Open the backend named by `config`
pub fn open(config: &GrantStoreConfig) -> Result<Arc<dyn GrantStore>> {
    match config {
        GrantStoreConfig::Memory => Ok(Arc::new(MemoryGrantStore::new())),
        GrantStoreConfig::Sqlite { path } => Ok(Arc::new(SqliteGrantStore::open(path)?)),
    }
}
