//! # backup-acl - Access control and sharing for multi-tenant backups
//!
//! `backup-acl` decides who may view, restore, delete or duplicate a backup
//! in an organization shared by many users and groups. Access comes from
//! ownership, direct shares to users or groups, and cluster share rules
//! that extend to every backup taken from a cluster, including future ones.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backup_acl::{AccessEngine, AccessLevel, BackupSpec, Caller, Operation, Result};
//!
//! # fn main() -> Result<()> {
//! let engine = AccessEngine::in_memory()?;
//! engine.add_user("alice", "Alice", "A", "alice@example.com")?;
//! engine.add_user("bob", "Bob", "B", "bob@example.com")?;
//!
//! let alice = engine.caller_for("alice")?;
//! engine.register_cluster(&alice, "prod")?;
//! engine.create_backup(&alice, BackupSpec::new("nightly", "prod"))?;
//!
//! engine.share_backup(&alice, "nightly", &[], &["bob".to_string()], AccessLevel::Restore)?;
//!
//! let bob = engine.caller_for("bob")?;
//! engine.authorize(&bob, &"nightly".into(), Operation::Restore)?;
//! assert!(engine.authorize(&bob, &"nightly".into(), Operation::Delete).is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use backup_acl::{AccessEngine, Result};
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let engine = AccessEngine::builder()
//!     .org_id("acme")
//!     .worker_pool_size(16)
//!     .listing_ttl(Duration::from_secs(5))
//!     .sqlite("/var/lib/backup-acl/grants.db")
//!     .build()?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod gate;
pub mod listing;
pub mod model;
pub mod ownership;
pub mod poll;
pub mod pool;
pub mod propagation;
pub mod resolver;
pub mod scenario;
pub mod store;
pub mod validation;

pub use audit::{AuditAction, AuditEvent, AuditLog, AuditOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, GrantStoreConfig};
pub use engine::{AccessEngine, EngineBuilder};
pub use error::{AclError, Result};
pub use listing::ListedBackup;
pub use model::{
    AccessGrant, AccessLevel, AuxKind, BackupObject, BackupRef, BackupSpec, BackupUid, Caller,
    Capability, ClusterId, ClusterShareRule, CollaboratorAccess, EffectiveAccess, GrantOrigin,
    LifecycleState, Operation, OwnershipUpdate, PrincipalId, Role,
};
pub use pool::{BulkOutcome, WorkerPool};
pub use propagation::ShareStatus;
pub use resolver::{AccessExplanation, AccessSource};
pub use scenario::{CheckResult, Expectation, Scenario};
pub use store::{GrantStore, MemoryGrantStore, SqliteGrantStore};
