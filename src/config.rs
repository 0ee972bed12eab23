//! Entitlement configuration
//!
//! Loaded from TOML or YAML (picked by file extension). A missing file is not an
//! error: defaults apply and a warning is logged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EntitlementError, EntitlementResult};

/// Default number of free-tier views per calendar day
pub const DEFAULT_MAX_FREE_VIEWS_PER_DAY: u32 = 3;

/// Default re-verification cadence in whole hours
pub const DEFAULT_VERIFICATION_INTERVAL_HOURS: i64 = 24;

/// Largest real-world UTC offset, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Free-view quota settings
    pub quota: QuotaConfig,

    /// Verification cadence settings
    pub verification: VerificationConfig,

    /// Persistence settings
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Views a free-tier user may open per calendar day
    pub max_free_views_per_day: u32,

    /// Offset from UTC used to cut calendar days
    pub utc_offset_minutes: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_free_views_per_day: DEFAULT_MAX_FREE_VIEWS_PER_DAY,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Whole hours after which the entitlement must be re-verified
    pub interval_hours: i64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            interval_hours: DEFAULT_VERIFICATION_INTERVAL_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the store (None = in-memory only)
    pub path: Option<PathBuf>,
}

impl EntitlementConfig {
    /// Load configuration from `path`, falling back to defaults if it is absent
    pub fn load(path: impl AsRef<Path>) -> EntitlementResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(EntitlementError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> EntitlementResult<Self> {
        toml::from_str(content)
            .map_err(|e| EntitlementError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_yaml_str(content: &str) -> EntitlementResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| EntitlementError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Reject settings that would make the quota or verification rules meaningless
    pub fn validate(&self) -> EntitlementResult<()> {
        if self.quota.max_free_views_per_day == 0 {
            return Err(EntitlementError::Config(
                "quota.max_free_views_per_day must be at least 1".to_string(),
            ));
        }
        if self.quota.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(EntitlementError::Config(format!(
                "quota.utc_offset_minutes must be within ±{}",
                MAX_UTC_OFFSET_MINUTES
            )));
        }
        if self.verification.interval_hours <= 0 {
            return Err(EntitlementError::Config(
                "verification.interval_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
