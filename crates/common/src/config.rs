//! Engine configuration
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Base trait for all configuration types
pub trait Configuration: Serialize + for<'de> Deserialize<'de> + Default {
    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Load configuration from a file
    fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| Error::configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

/// Settings for the evaluation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum simultaneous pin fetches when resolving snapshots
    #[serde(default = "default_concurrency")]
    pub snapshot_concurrency: usize,

    /// Maximum simultaneous operand reads when loading holdings
    #[serde(default = "default_concurrency")]
    pub operand_concurrency: usize,

    /// Shortest pending or voting period a group may declare, in seconds
    #[serde(default = "default_min_period_secs")]
    pub min_period_secs: u64,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_concurrency() -> usize {
    5
}

fn default_min_period_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_concurrency: default_concurrency(),
            operand_concurrency: default_concurrency(),
            min_period_secs: default_min_period_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Configuration for EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.snapshot_concurrency == 0 {
            return Err(Error::configuration("snapshot_concurrency must be at least 1"));
        }
        if self.operand_concurrency == 0 {
            return Err(Error::configuration("operand_concurrency must be at least 1"));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(Error::configuration(format!(
                    "Invalid log level: {}",
                    self.log_level
                )))
            }
        }

        Ok(())
    }
}

impl EngineConfig {
    /// Build a configuration from `VOTY_*` environment variables, falling
    /// back to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("VOTY_SNAPSHOT_CONCURRENCY") {
            config.snapshot_concurrency = parse_env("VOTY_SNAPSHOT_CONCURRENCY", &value)?;
        }

        if let Ok(value) = std::env::var("VOTY_OPERAND_CONCURRENCY") {
            config.operand_concurrency = parse_env("VOTY_OPERAND_CONCURRENCY", &value)?;
        }

        if let Ok(value) = std::env::var("VOTY_MIN_PERIOD_SECS") {
            config.min_period_secs = parse_env("VOTY_MIN_PERIOD_SECS", &value)?;
        }

        if let Ok(level) = std::env::var("VOTY_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Install the global tracing subscriber at this configuration's level
    pub fn init_logging(&self, log_dir: Option<&Path>, name: &str) -> Result<()> {
        self.validate()?;
        crate::logging::init_logging(log_dir, name, &self.log_level)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::configuration(format!("Invalid value for {}: {}", name, value)))
}
