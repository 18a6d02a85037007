//! Validation for principal and object names
//!
//! Every user, group, cluster, backup, restore and auxiliary object name
//! passes through [`ObjectName`] before it reaches a store.

use crate::error::{AclError, Result};
use regex::Regex;

/// A validated object name
///
/// # Rules
/// - ASCII letters, digits, `.`, `_`, `@` and `-` only
/// - Length: 1-255 characters
///
/// Valid names:
/// - "tp-user-1"
/// - "jane.doe@example.com"
/// - "nightly_full"
///
/// Invalid names:
/// - "" (empty)
/// - "my backup" (whitespace)
/// - "team/ops" (slash)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(String);

impl ObjectName {
    const PATTERN: &'static str = r"^[A-Za-z0-9._@-]+$";

    const MAX_LENGTH: usize = 255;

    /// Create a new validated name
    ///
    /// ```
    /// use backup_acl::validation::ObjectName;
    ///
    /// let name = ObjectName::new("tp-user-1").unwrap();
    /// assert_eq!(name.as_str(), "tp-user-1");
    ///
    /// assert!(ObjectName::new("").is_err());
    /// assert!(ObjectName::new("has space").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(ObjectName(name))
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(AclError::InvalidArgument(
                "name cannot be empty".to_string(),
            ));
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(AclError::InvalidArgument(format!(
                "name too long (max {} characters)",
                Self::MAX_LENGTH
            )));
        }

        let re = Regex::new(Self::PATTERN).map_err(|e| AclError::Internal(e.to_string()))?;
        if !re.is_match(name) {
            return Err(AclError::InvalidArgument(format!(
                "name '{}' may only contain letters, digits, '.', '_', '@' and '-'",
                name
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a name and hand back an owned `String`
pub fn validate_name(name: &str) -> Result<String> {
    ObjectName::new(name).map(ObjectName::into_string)
}

/// Reject an empty principal list in a share request
pub fn require_principals(groups: &[String], users: &[String]) -> Result<()> {
    if groups.is_empty() && users.is_empty() {
        return Err(AclError::InvalidArgument(
            "share request names no users or groups".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(ObjectName::new("a").is_ok());
        assert!(ObjectName::new("tp-user-17").is_ok());
        assert!(ObjectName::new("jane.doe@example.com").is_ok());
        assert!(ObjectName::new("Backup_Nightly-01").is_ok());
        assert!(ObjectName::new("x".repeat(255)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(ObjectName::new("").is_err());
        assert!(ObjectName::new("with space").is_err());
        assert!(ObjectName::new("team/ops").is_err());
        assert!(ObjectName::new("x".repeat(256)).is_err());
        assert!(ObjectName::new("tab\tname").is_err());
    }

    #[test]
    fn test_require_principals() {
        assert!(require_principals(&[], &[]).is_err());
        assert!(require_principals(&["g".to_string()], &[]).is_ok());
        assert!(require_principals(&[], &["u".to_string()]).is_ok());
    }
}
