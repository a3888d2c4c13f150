//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/insights/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/insights/` (~/.config/insights/)
//! - Data: `$XDG_DATA_HOME/insights/` (~/.local/share/insights/)
//! - State/Logs: `$XDG_STATE_HOME/insights/` (~/.local/state/insights/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Ingestion endpoint and credentials
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Defaults applied to every new tracker
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Recurring flush cadence and backoff
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Queue storage location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ingestion endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Base URL of the ingestion service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Application ID sent with every request
    pub app_id: Option<String>,

    /// API key sent with every request
    pub api_key: Option<String>,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            app_id: None,
            api_key: None,
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://insights.algolia.io".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl IngestionConfig {
    /// Check if credentials are present
    pub fn is_ready(&self) -> bool {
        self.app_id.is_some() && self.api_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "ingestion.endpoint must not be empty".to_string(),
            ));
        }
        if self.app_id.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("ingestion.app_id is required".to_string()));
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("ingestion.api_key is required".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(Error::Config(
                "ingestion timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Timeouts as a tracker-facing configuration
    pub fn timeouts(&self) -> Configuration {
        Configuration {
            connect_timeout_ms: self.connect_timeout_ms,
            read_timeout_ms: self.read_timeout_ms,
        }
    }
}

/// Network timeouts exposed on every tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Configuration {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Tracker defaults
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Queue length that triggers an immediate upload
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// Whether new trackers accept events
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_batch_size: default_min_batch_size(),
            enabled: default_enabled(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(Error::Config(
                "tracker.min_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_min_batch_size() -> usize {
    10
}

fn default_enabled() -> bool {
    true
}

/// Recurring flush configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Seconds between two regular flushes
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// First delay after a failed flush
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the backoff delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SchedulerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Reject settings that would make the scheduler spin
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "scheduler.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.initial_backoff_ms == 0 {
            return Err(Error::Config(
                "scheduler.initial_backoff_ms must be at least 1".to_string(),
            ));
        }
        if self.max_backoff() < self.initial_backoff() {
            return Err(Error::Config(
                "scheduler.max_backoff_secs must not be below scheduler.initial_backoff_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn default_flush_interval() -> u64 {
    900
}

fn default_initial_backoff() -> u64 {
    30_000
}

fn default_max_backoff() -> u64 {
    3600
}

/// Queue storage configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Override for the SQLite queue file
    pub database_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate every section needed to run the pipeline
    pub fn validate(&self) -> Result<()> {
        self.ingestion.validate()?;
        self.tracker.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/insights/config.toml` (~/.config/insights/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("insights").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite queue)
    ///
    /// `$XDG_DATA_HOME/insights/` (~/.local/share/insights/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("insights")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/insights/` (~/.local/state/insights/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("insights")
    }

    /// Returns the queue database path, honoring `storage.database_path`
    ///
    /// `$XDG_DATA_HOME/insights/events.db` (~/.local/share/insights/events.db)
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("events.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingestion.endpoint, "https://insights.algolia.io");
        assert_eq!(config.ingestion.connect_timeout_ms, 5000);
        assert_eq!(config.ingestion.read_timeout_ms, 5000);
        assert_eq!(config.tracker.min_batch_size, 10);
        assert!(config.tracker.enabled);
        assert_eq!(config.scheduler.flush_interval_secs, 900);
        assert_eq!(config.logging.level, "info");
        assert!(!config.ingestion.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[ingestion]
endpoint = "http://localhost:8080"
app_id = "testApp"
api_key = "testKey"
connect_timeout_ms = 1000

[tracker]
min_batch_size = 4
enabled = false

[scheduler]
flush_interval_secs = 60

[storage]
database_path = "/tmp/insights/events.db"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.ingestion.endpoint, "http://localhost:8080");
        assert_eq!(config.ingestion.app_id.as_deref(), Some("testApp"));
        assert_eq!(config.ingestion.connect_timeout_ms, 1000);
        assert_eq!(config.ingestion.read_timeout_ms, 5000);
        assert_eq!(config.tracker.min_batch_size, 4);
        assert!(!config.tracker.enabled);
        assert_eq!(config.scheduler.flush_interval(), Duration::from_secs(60));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/insights/events.db")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ingestion_validation() {
        let config = IngestionConfig::default();
        assert!(config.validate().is_err());

        let config = IngestionConfig {
            app_id: Some("testApp".to_string()),
            api_key: Some("testKey".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());

        let config = IngestionConfig {
            app_id: Some("testApp".to_string()),
            api_key: Some("testKey".to_string()),
            read_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracker_validation() {
        let config = TrackerConfig {
            min_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_scheduler_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());

        let config: Config = toml::from_str(
            r#"
[ingestion]
app_id = "testApp"
api_key = "testKey"

[scheduler]
flush_interval_secs = 0
initial_backoff_ms = 0
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let no_backoff = SchedulerConfig {
            initial_backoff_ms: 0,
            ..Default::default()
        };
        assert!(no_backoff.validate().is_err());

        let inverted = SchedulerConfig {
            initial_backoff_ms: 10_000,
            max_backoff_secs: 5,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let tight = SchedulerConfig {
            flush_interval_secs: 1,
            initial_backoff_ms: 1000,
            max_backoff_secs: 1,
        };
        assert!(tight.validate().is_ok());
    }

    #[test]
    fn test_configuration_durations() {
        let timeouts = Configuration {
            connect_timeout_ms: 250,
            read_timeout_ms: 1500,
        };
        assert_eq!(timeouts.connect_timeout(), Duration::from_millis(250));
        assert_eq!(timeouts.read_timeout(), Duration::from_millis(1500));
    }
}
