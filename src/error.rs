//! Error types for access-control operations
//!
//! The first four variants are the authorization taxonomy callers match on.
//! Their rendered messages are stable: orchestration layers search them for
//! substrings such as "doesn't have permission to delete backup" or
//! "object not found".

use thiserror::Error;

/// Access-control result type
pub type Result<T> = std::result::Result<T, AclError>;

/// Access-control errors
#[derive(Error, Debug)]
pub enum AclError {
    /// Effective access is below what the action requires
    #[error("user [{principal}] doesn't have permission to {action} {target}")]
    PermissionDenied {
        principal: String,
        action: String,
        target: String,
    },

    /// Referenced object does not exist in the caller's visibility scope
    #[error("NotFound desc = {0}")]
    NotFound(String),

    /// Malformed or self-contradictory request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A uniquely-named object already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Polling for an eventually-consistent state gave up
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Grant store backend failed
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker unit panicked before reporting its outcome
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AclError {
    /// Build a permission error for `action` on `target`
    pub fn denied(
        principal: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        AclError::PermissionDenied {
            principal: principal.into(),
            action: action.into(),
            target: target.into(),
        }
    }

    /// `failed to retrieve <what> [<name>]: object not found`
    pub fn not_found(what: &str, name: impl std::fmt::Display) -> Self {
        AclError::NotFound(format!("failed to retrieve {} [{}]: object not found", what, name))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AclError::PermissionDenied { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AclError::NotFound(_))
    }

    /// Only eventual-consistency timeouts are worth retrying.
    /// PermissionDenied and NotFound are definitive answers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AclError::Timeout(_))
    }
}

impl From<validator::ValidationErrors> for AclError {
    fn from(err: validator::ValidationErrors) -> Self {
        AclError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_message_is_matchable() {
        let err = AclError::denied("alice", "delete", "backup [nightly]");
        let msg = err.to_string();
        assert!(msg.contains("doesn't have permission to delete backup"));
        assert!(msg.contains("[alice]"));
        assert!(err.is_permission_denied());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = AclError::not_found("cluster", "source-cluster");
        assert_eq!(
            err.to_string(),
            "NotFound desc = failed to retrieve cluster [source-cluster]: object not found"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_only_timeouts_retry() {
        assert!(AclError::Timeout("share status".into()).is_retryable());
        assert!(!AclError::NotFound("x".into()).is_retryable());
        assert!(!AclError::Conflict("x".into()).is_retryable());
    }
}
