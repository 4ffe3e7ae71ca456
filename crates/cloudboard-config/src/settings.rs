//! Reconciliation settings
//!
//! Every field has a default so a partial (or missing) file is valid.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest operation timeout accepted (7 days)
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Polling and concurrency limits for remote operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// How long one operation may stay pending before it is reported as timed out
    pub timeout_secs: u64,
    /// Base interval between status queries
    pub poll_interval_ms: u64,
    /// Random spread applied to the poll interval (0.2 = ±20%)
    pub jitter_ratio: f64,
    /// Maximum operations in flight within one reconciliation
    pub max_in_flight: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            poll_interval_ms: 10_000,
            jitter_ratio: 0.2,
            max_in_flight: 4,
        }
    }
}

/// Backoff for transient status query failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracker: TrackerSettings,
    pub retry: RetrySettings,
    /// Permission tables to load instead of the built-in ones
    pub catalog_path: Option<PathBuf>,
    /// Directory holding the pending-operation ledger
    pub ledger_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate().map_err(|e| match e {
            ConfigError::InvalidSettings(message) => ConfigError::Invalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Reject values the tracker cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(ConfigError::InvalidSettings(message.to_string()));

        if self.tracker.max_in_flight == 0 {
            return invalid("tracker.max_in_flight must be at least 1");
        }
        if self.tracker.timeout_secs == 0 || self.tracker.timeout_secs > MAX_TIMEOUT_SECS {
            return invalid("tracker.timeout_secs must be between 1 and 604800 (7 days)");
        }
        if self.tracker.poll_interval_ms == 0 {
            return invalid("tracker.poll_interval_ms must be positive");
        }
        if !(0.0..1.0).contains(&self.tracker.jitter_ratio) {
            return invalid("tracker.jitter_ratio must be in [0, 1)");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be a finite number >= 1.0");
        }
        Ok(())
    }
}
