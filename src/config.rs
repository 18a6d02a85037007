//! Engine configuration
//!
//! Loaded from TOML or assembled with [`crate::EngineBuilder`]. Every field
//! has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! org_id = "default"
//! worker_pool_size = 16
//! listing_ttl_secs = 30
//!
//! [grant_store]
//! backend = "sqlite"
//! path = "/var/lib/backup-acl/grants.db"
//! ```

use crate::error::{AclError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Where grants and cluster share rules are kept
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum GrantStoreConfig {
    #[default]
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_polling"))]
pub struct EngineConfig {
    #[validate(length(min = 1, max = 255))]
    pub org_id: String,

    /// Directory name of the administrative user
    #[validate(length(min = 1, max = 255))]
    pub admin_name: String,

    /// Upper bound on concurrently running units in bulk operations
    #[validate(range(min = 1, max = 256))]
    pub worker_pool_size: usize,

    #[validate(range(min = 1))]
    pub listing_cache_capacity: usize,

    /// How long a cached backup listing may be served
    pub listing_ttl_secs: u64,

    /// Delay before a cluster share change is fanned out
    pub propagation_delay_secs: u64,

    pub share_status_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub share_status_interval_secs: u64,

    #[validate(range(min = 1))]
    pub audit_capacity: usize,

    pub grant_store: GrantStoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            org_id: "default".to_string(),
            admin_name: "px-central-admin".to_string(),
            worker_pool_size: 8,
            listing_cache_capacity: 1024,
            listing_ttl_secs: 10,
            propagation_delay_secs: 0,
            share_status_timeout_secs: 60,
            share_status_interval_secs: 10,
            audit_capacity: 4096,
            grant_store: GrantStoreConfig::Memory,
        }
    }
}

fn validate_polling(config: &EngineConfig) -> std::result::Result<(), ValidationError> {
    if config.share_status_interval_secs > config.share_status_timeout_secs {
        let mut err = ValidationError::new("polling");
        err.message = Some("share_status_interval_secs exceeds share_status_timeout_secs".into());
        return Err(err);
    }
    Ok(())
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| AclError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AclError::Config(e.to_string()))
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }

    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn share_status_timeout(&self) -> Duration {
        Duration::from_secs(self.share_status_timeout_secs)
    }

    pub fn share_status_interval(&self) -> Duration {
        Duration::from_secs(self.share_status_interval_secs)
    }
}
