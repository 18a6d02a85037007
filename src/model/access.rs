//! Access lattices
//!
//! Two independent lattices live here:
//! - [`AccessLevel`] for backups: `ViewOnly < Restore < Full`, with "no access"
//!   expressed as `None` in [`EffectiveAccess`]
//! - [`CollaboratorAccess`] for auxiliary objects: `Invalid < Read < Write`

use crate::error::{AclError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access level on a single backup, totally ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    /// Enumerate and inspect the backup
    #[serde(rename = "view-only", alias = "ViewOnlyAccess")]
    ViewOnly = 1,
    /// View plus restore from the backup
    #[serde(rename = "restore", alias = "RestoreAccess")]
    Restore = 2,
    /// Restore plus delete and duplicate
    #[serde(rename = "full", alias = "FullAccess")]
    Full = 3,
}

/// Resolved access of a principal on an object. `None` sorts below every
/// level, so combining sources is a plain `max`.
pub type EffectiveAccess = Option<AccessLevel>;

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::ViewOnly, AccessLevel::Restore, AccessLevel::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::ViewOnly => "ViewOnlyAccess",
            AccessLevel::Restore => "RestoreAccess",
            AccessLevel::Full => "FullAccess",
        }
    }

    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(AccessLevel::ViewOnly),
            2 => Some(AccessLevel::Restore),
            3 => Some(AccessLevel::Full),
            _ => None,
        }
    }

    /// Whether this level is enough for `op`
    pub fn permits(&self, op: Operation) -> bool {
        *self >= op.required_level()
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "viewonly" | "viewonlyaccess" | "view" => Ok(AccessLevel::ViewOnly),
            "restore" | "restoreaccess" => Ok(AccessLevel::Restore),
            "full" | "fullaccess" => Ok(AccessLevel::Full),
            _ => Err(AclError::InvalidArgument(format!(
                "invalid access level '{}'. Valid options: view-only, restore, full",
                s
            ))),
        }
    }
}

/// Combine two resolved access values
pub fn combine(a: EffectiveAccess, b: EffectiveAccess) -> EffectiveAccess {
    a.max(b)
}

/// Operations gated on a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    View,
    Restore,
    Delete,
    Duplicate,
}

impl Operation {
    pub fn required_level(&self) -> AccessLevel {
        match self {
            Operation::View => AccessLevel::ViewOnly,
            Operation::Restore => AccessLevel::Restore,
            Operation::Delete | Operation::Duplicate => AccessLevel::Full,
        }
    }

    /// Verb used in permission messages
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Restore => "restore",
            Operation::Delete => "delete",
            Operation::Duplicate => "duplicate",
        }
    }
}

impl FromStr for Operation {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "view" | "inspect" => Ok(Operation::View),
            "restore" => Ok(Operation::Restore),
            "delete" => Ok(Operation::Delete),
            "duplicate" => Ok(Operation::Duplicate),
            _ => Err(AclError::InvalidArgument(format!("unknown operation '{}'", s))),
        }
    }
}

/// Collaborator access on auxiliary objects (backup locations, schedule
/// policies, rules, cloud credentials)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorAccess {
    /// No collaborator access; used to clear an existing entry
    #[default]
    Invalid,
    /// Enumerate only
    Read,
    /// Use as an input when creating backups and schedules
    Write,
}

impl CollaboratorAccess {
    pub fn permits(&self, needed: CollaboratorAccess) -> bool {
        needed != CollaboratorAccess::Invalid && *self >= needed
    }
}
