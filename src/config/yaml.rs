//! YAML configuration parsing.
//!
//! Parses engine settings from a YAML file and layers environment
//! variable overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::ConfigError;
use crate::core::retry::RetryPolicy;

/// Environment variable overriding `poll_interval_secs`.
pub const ENV_POLL_INTERVAL: &str = "HOOKRUN_POLL_INTERVAL_SECS";
/// Environment variable overriding `max_retries`.
pub const ENV_MAX_RETRIES: &str = "HOOKRUN_MAX_RETRIES";
/// Environment variable overriding `backoff_secs`, as a comma list.
pub const ENV_BACKOFF: &str = "HOOKRUN_BACKOFF_SECS";
/// Environment variable overriding `request_timeout_secs`.
pub const ENV_REQUEST_TIMEOUT: &str = "HOOKRUN_REQUEST_TIMEOUT_SECS";
/// Environment variable selecting a SQLite database path.
pub const ENV_DATABASE: &str = "HOOKRUN_DATABASE";
/// Environment variable that keeps the polling loop from starting.
pub const ENV_DISABLE_WORKER: &str = "DISABLE_WORKER";

/// Engine configuration (hookrun.yaml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between due-checks.
    pub poll_interval_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff schedule in seconds; saturates at the last entry.
    pub backoff_secs: Vec<u64>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight retry sequences.
    pub shutdown_timeout_secs: u64,
    /// Never start the polling loop.
    pub disable_worker: bool,
    /// Keep a dead-letter entry when its replay fails.
    pub keep_dead_letter_on_failed_replay: bool,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP API configuration.
    pub api: ApiConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_retries: 3,
            backoff_secs: vec![1, 2, 4],
            request_timeout_secs: 10,
            shutdown_timeout_secs: 30,
            disable_worker: false,
            keep_dead_letter_on_failed_replay: false,
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// In-memory storage (default, non-persistent).
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// SQLite storage.
    #[serde(rename = "sqlite")]
    Sqlite {
        /// Path to the database file.
        path: String,
    },
}

/// HTTP API bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8565,
        }
    }
}

impl ApiConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// The retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.backoff_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        )
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Unset variables leave the current value alone; malformed values are
    /// an error rather than silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = parse_env(ENV_POLL_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_env(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_BACKOFF) {
            self.backoff_secs = value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse_env(ENV_BACKOFF, part))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(path) = lookup(ENV_DATABASE).filter(|p| !p.trim().is_empty()) {
            self.storage = StorageConfig::Sqlite { path };
        }
        if let Some(value) = lookup(ENV_DISABLE_WORKER) {
            self.disable_worker = is_truthy(&value);
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.backoff_secs.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "backoff_secs must have at least one entry".to_string(),
            ));
        }
        if let StorageConfig::Sqlite { path } = &self.storage {
            if path.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "sqlite storage requires a path".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Loader for YAML configuration files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load engine configuration from a file.
    pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse engine configuration from a YAML string.
    pub fn parse_engine_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
