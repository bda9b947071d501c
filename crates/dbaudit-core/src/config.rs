//! Configuration loaded from the environment
//!
//! Every field is read from a `DBAUDIT_`-prefixed environment variable, for example
//! `DBAUDIT_COMMIT_WORKERS=4`. Missing variables fall back to their defaults.
//!
//! ```ignore
//! use dbaudit_core::config::{load_dotenv, AuditConfig};
//!
//! load_dotenv();
//! let config = AuditConfig::from_env()?;
//! ```

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every configuration variable
pub const ENV_PREFIX: &str = "DBAUDIT_";

/// Error type for configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed.
    #[error("Configuration error: {0}")]
    Envy(#[from] envy::Error),

    /// A value parsed but is not usable.
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for the audit pipeline and its commit workers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Run change detection on the tracker before every save
    pub auto_detect_changes: bool,
    /// Number of background workers committing ChangeSets
    pub commit_workers: usize,
    /// Attempts per background commit before it is dead-lettered
    pub commit_max_attempts: u32,
    /// Base of the exponential backoff between commit attempts
    pub commit_retry_backoff_ms: u64,
    /// How long an idle worker waits before polling again
    pub poll_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
            commit_workers: 1,
            commit_max_attempts: 3,
            commit_retry_backoff_ms: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl AuditConfig {
    /// Read the configuration from `DBAUDIT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()
    }

    /// Read the configuration from explicit key/value pairs (keys carry the prefix)
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(pairs)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.commit_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "commit_workers",
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.commit_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "commit_max_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        Ok(self)
    }

    pub fn commit_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.commit_retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load environment variables from a `.env` file, if one exists.
///
/// Returns `true` when a file was found and loaded.
pub fn load_dotenv() -> bool {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env file");
            true
        }
        Err(e) if e.not_found() => false,
        Err(e) => {
            tracing::warn!("failed to load .env file: {}", e);
            false
        }
    }
}
