//! Configuration loading and parsing.
//!
//! Engine settings come from defaults, an optional YAML file, and
//! environment variables, in increasing order of precedence.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{
    ApiConfig, ENV_BACKOFF, ENV_DATABASE, ENV_DISABLE_WORKER, ENV_MAX_RETRIES, ENV_POLL_INTERVAL,
    ENV_REQUEST_TIMEOUT, EngineConfig, StorageConfig, YamlLoader,
};
