//! Service configuration loading and validation.
//!
//! Configuration is a single JSON document with a `storage` section (where
//! uploads land and where resumable uploads accumulate) and a `batch` section
//! (lifetime of in-memory transfer batches).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub storage: StorageSettings,
    pub batch: BatchSettings,
}

/// Filesystem roots used by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Absolute directory all placed files are confined to.
    pub upload_root: String,
    /// Directory where resumable uploads accumulate before placement.
    pub staging_root: String,
}

/// Lifetime settings for in-memory transfer batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSettings {
    /// Sliding TTL per batch, refreshed on every save. 0 expires immediately.
    pub sliding_ttl_minutes: u64,
    /// Interval between background expiry sweeps.
    pub sweep_interval_seconds: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            sliding_ttl_minutes: 1440,
            sweep_interval_seconds: 300,
        }
    }
}

impl BatchSettings {
    /// Sliding TTL as a [`Duration`].
    pub fn sliding_ttl(&self) -> Duration {
        Duration::from_secs(self.sliding_ttl_minutes * 60)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl ServiceConfig {
    /// Loads and validates configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// The upload root must be a non-blank absolute path so the sandbox
    /// boundary is unambiguous. The staging root must be non-blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_root.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.uploadRoot is required".into()));
        }

        if !Path::new(self.storage.upload_root.trim()).is_absolute() {
            return Err(ConfigError::Invalid(
                "storage.uploadRoot must be an absolute path".into(),
            ));
        }

        if self.storage.staging_root.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.stagingRoot is required".into(),
            ));
        }

        Ok(())
    }
}
