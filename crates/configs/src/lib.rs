//! # configs
//!
//! Layered application configuration: defaults, then an optional config file,
//! then `RV_*` environment variables (`RV_DATABASE__URL`, `RV_LOGGING__FILTER`, ...).
//! A `.env` file is read first if present.

pub mod telemetry;

use std::collections::HashMap;

use rv_core::ReviewableSpec;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config/default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Reviewable types to register at startup, keyed by type name.
    #[serde(default)]
    pub reviewables: HashMap<String, ReviewableSpec>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// e.g. `sqlite://reviews.db`
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string(), json: false }
    }
}

impl AppConfig {
    /// Loads from `$RV_CONFIG` (or `config/default.*`) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), but an explicit `path` takes precedence
    /// over `$RV_CONFIG`.
    pub fn load_with(path: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = match path {
            Some(path) => path.to_string(),
            None => std::env::var("RV_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        };
        Self::load_from(&path)
    }

    /// Loads from the given file (extension optional, missing file allowed)
    /// and the environment.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        debug!(path, "loading configuration");
        let config = config::Config::builder()
            .set_default("database.url", "sqlite://reviews.db")?
            .set_default("database.max_connections", 5)?
            .set_default("logging.filter", "info")?
            .set_default("logging.json", false)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RV")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
