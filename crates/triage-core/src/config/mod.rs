//! Configuration management for triage runs.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. CLI flags override individual values per run.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::harness::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Online adaptive triage loop
    pub online: OnlineConfig,

    /// Offline policy evaluation
    pub offline: OfflineConfig,

    /// Simulator execution retries
    pub execution: ExecutionConfig,

    /// Classifier toolkit invocation
    pub classifier: ClassifierConfig,

    /// Test generator and simulator programs
    pub harness: HarnessConfig,

    /// Feature schema
    pub features: FeaturesConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.triage.triage/config.toml
    /// - Linux: ~/.config/triage/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\triage\config\config.toml
    ///
    /// Falls back to ~/.triage/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "triage", "triage")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".triage").join("config.toml")
            })
    }

    /// Get the resolved output directory path (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        let path_str = self.general.output_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Execution retry policy derived from `[execution]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.execution.retry_delay_ms),
            cancel_at_deadline: self.execution.cancel_at_deadline,
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
