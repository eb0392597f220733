//! Configuration types for the reminder engine.

use crate::clock::DayBoundary;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-user tracker timing.
    pub tracker: TrackerConfig,
    /// Reminder delivery.
    pub notifier: NotifierConfig,
    /// Goal store backend.
    pub store: StoreConfig,
}

/// Timing of the per-user tracker tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between reminder cycles. The first cycle runs one full
    /// interval after tracking starts.
    pub interval_secs: u64,
    /// Upper bound in seconds on a single reminder delivery.
    pub notify_timeout_secs: u64,
    /// Time zone used for day-rollover detection.
    pub day_boundary: DayBoundary,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3 * 3600,
            notify_timeout_secs: 30,
            day_boundary: DayBoundary::Local,
        }
    }
}

impl TrackerConfig {
    /// Reminder interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-send delivery bound as a `Duration`.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

/// Reminder transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Write reminders to the log only.
    #[default]
    Log,
    /// POST reminders as JSON to `webhook_url`.
    Webhook,
}

/// Reminder delivery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    /// Endpoint for [`NotifierKind::Webhook`].
    pub webhook_url: Option<String>,
    /// Sender address placed in the reminder's `from` field.
    pub sender: Option<String>,
}

/// Goal store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `None` keeps goals in memory.
    pub db_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/goalkeeper/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("goalkeeper").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("goalkeeper")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/goalkeeper-config/config.toml")
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.interval_secs == 0 {
            return Err(EngineError::Config(
                "tracker.interval_secs must be greater than zero".to_owned(),
            ));
        }
        if self.tracker.notify_timeout_secs == 0 {
            return Err(EngineError::Config(
                "tracker.notify_timeout_secs must be greater than zero".to_owned(),
            ));
        }
        if self.notifier.kind == NotifierKind::Webhook
            && self
                .notifier
                .webhook_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            return Err(EngineError::Config(
                "notifier.webhook_url is required for the webhook notifier".to_owned(),
            ));
        }
        Ok(())
    }
}
