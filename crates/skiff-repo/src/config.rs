//! Clientset configuration
//!
//! Stored in `~/.config/skiff/config.yaml`; every field is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Namespace holding repository auth secrets
pub const DEFAULT_SECRET_NAMESPACE: &str = "skiff-system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsetConfig {
    /// Time-to-live of a repository's cached catalog
    #[serde(default = "default_max_cache_age", with = "humantime_serde")]
    pub max_cache_age: Duration,

    /// How long a cached client is trusted before its repository is re-read
    #[serde(default = "default_client_check_interval", with = "humantime_serde")]
    pub client_check_interval: Duration,

    #[serde(default = "default_secret_namespace")]
    pub secret_namespace: String,
}

fn default_max_cache_age() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_client_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_secret_namespace() -> String {
    DEFAULT_SECRET_NAMESPACE.to_string()
}

impl Default for ClientsetConfig {
    fn default() -> Self {
        Self {
            max_cache_age: default_max_cache_age(),
            client_check_interval: default_client_check_interval(),
            secret_namespace: default_secret_namespace(),
        }
    }
}

impl ClientsetConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("skiff").join("config.yaml"))
    }

    pub fn with_max_cache_age(mut self, max_cache_age: Duration) -> Self {
        self.max_cache_age = max_cache_age;
        self
    }

    pub fn with_client_check_interval(mut self, interval: Duration) -> Self {
        self.client_check_interval = interval;
        self
    }
}
