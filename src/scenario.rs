//! Replayable sharing scenarios
//!
//! A scenario lists users, groups, clusters, backups and shares in TOML,
//! followed by access checks with their expected outcome. `acl-sim`
//! drives this module from the command line.
//!
//! ```toml
//! users = [{ name = "alice" }, { name = "bob" }]
//! clusters = [{ owner = "alice", name = "prod" }]
//! backups = [{ owner = "alice", name = "nightly", cluster = "prod" }]
//! shares = [{ by = "alice", backup = "nightly", users = ["bob"], level = "restore" }]
//! checks = [{ user = "bob", backup = "nightly", operation = "restore", expect = "allowed" }]
//! ```

use crate::engine::AccessEngine;
use crate::error::{AclError, Result};
use crate::model::{AccessLevel, BackupRef, BackupSpec, Operation};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub users: Vec<UserDef>,
    pub groups: Vec<GroupDef>,
    pub clusters: Vec<ClusterDef>,
    pub backups: Vec<BackupDef>,
    pub shares: Vec<ShareDef>,
    pub cluster_shares: Vec<ClusterShareDef>,
    pub checks: Vec<CheckDef>,
}

#[derive(Debug, Deserialize)]
pub struct UserDef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupDef {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterDef {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BackupDef {
    pub owner: String,
    pub name: String,
    pub cluster: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareDef {
    pub by: String,
    pub backup: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct ClusterShareDef {
    pub by: String,
    pub cluster: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub level: String,
    #[serde(default = "enabled")]
    pub enable: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CheckDef {
    pub user: String,
    pub backup: String,
    pub operation: String,
    pub expect: Expectation,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    Allowed,
    Denied,
    NotFound,
}

/// One evaluated check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub user: String,
    pub backup: String,
    pub operation: Operation,
    pub expected: Expectation,
    pub actual: Expectation,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

impl Scenario {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AclError::Config(format!("invalid scenario: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Create every principal, cluster, backup and share in order, then run
    /// the propagation jobs that are already due
    pub fn replay(&self, engine: &AccessEngine) -> Result<()> {
        for user in &self.users {
            engine.add_user(&user.name, &user.name, "", &format!("{}@example.com", user.name))?;
        }
        for group in &self.groups {
            engine.add_group(&group.name)?;
            for member in &group.members {
                engine.add_user_to_group(member, &group.name)?;
            }
        }
        for cluster in &self.clusters {
            let caller = engine.caller_for(&cluster.owner)?;
            engine.register_cluster(&caller, &cluster.name)?;
        }
        for backup in &self.backups {
            let caller = engine.caller_for(&backup.owner)?;
            engine.create_backup(&caller, BackupSpec::new(&backup.name, &backup.cluster))?;
        }
        for share in &self.shares {
            let caller = engine.caller_for(&share.by)?;
            let level: AccessLevel = share.level.parse()?;
            engine.share_backup(&caller, &share.backup, &share.groups, &share.users, level)?;
        }
        for share in &self.cluster_shares {
            let caller = engine.caller_for(&share.by)?;
            let level: AccessLevel = share.level.parse()?;
            engine.cluster_update_backup_share(
                &caller,
                &share.cluster,
                &share.groups,
                &share.users,
                level,
                share.enable,
            )?;
        }

        if !self.cluster_shares.is_empty() {
            let ran = engine.run_pending_propagation()?;
            if engine.config().propagation_delay_secs > 0 {
                warn!("Propagation delay is set; jobs not yet due were left queued");
            }
            info!("Ran {} propagation jobs", ran);
        }
        Ok(())
    }

    /// Evaluate every check. Errors other than NotFound and PermissionDenied
    /// abort the run.
    pub fn run_checks(&self, engine: &AccessEngine) -> Result<Vec<CheckResult>> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let caller = engine.caller_for(&check.user)?;
            let operation: Operation = check.operation.parse()?;
            let reference = BackupRef::named(check.backup.as_str());

            let actual = match engine.authorize(&caller, &reference, operation) {
                Ok(_) => Expectation::Allowed,
                Err(e) if e.is_permission_denied() => Expectation::Denied,
                Err(e) if e.is_not_found() => Expectation::NotFound,
                Err(e) => return Err(e),
            };
            results.push(CheckResult {
                user: check.user.clone(),
                backup: check.backup.clone(),
                operation,
                expected: check.expect,
                actual,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_expectations() {
        let scenario = Scenario::from_toml_str(
            r#"
            [[cluster_shares]]
            by = "alice"
            cluster = "prod"
            users = ["bob"]
            level = "view"

            [[checks]]
            user = "bob"
            backup = "b"
            operation = "delete"
            expect = "not-found"
            "#,
        )
        .unwrap();
        assert!(scenario.users.is_empty());
        assert!(scenario.cluster_shares[0].enable);
        assert_eq!(scenario.checks[0].expect, Expectation::NotFound);
    }

    #[test]
    fn test_rejects_unknown_expectation() {
        let err = Scenario::from_toml_str(
            "[[checks]]\nuser = \"a\"\nbackup = \"b\"\noperation = \"view\"\nexpect = \"maybe\"",
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
