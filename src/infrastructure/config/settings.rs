//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings. The
//! TOML file is optional: every section has defaults, and credentials are
//! never read from it (they come from the environment, see
//! [`StreamConfig`](super::source::StreamConfig)).
//!
//! # Example
//!
//! ```no_run
//! use pkgstream::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("pkgstream.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use axum::http::HeaderValue;
use serde::Deserialize;

use super::consumer::ConsumerConfig;
use super::logging::LoggingConfig;
use super::relay::RelayConfig;
use super::source::SourceConfig;
use crate::error::{ConfigError, Result};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pkgstream.toml";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote log source: env var names, endpoint and record format.
    #[serde(default)]
    pub source: SourceConfig,

    /// Relay endpoint settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Resumable consumer settings.
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, or fails
    /// validation.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Load from `path` when given; otherwise load [`DEFAULT_CONFIG_FILE`]
    /// if it exists, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or discovered file fails to load.
    #[allow(clippy::result_large_err)]
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        let relay = &self.relay;
        if relay.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "relay.bind",
                reason: format!("'{}' is not a socket address", relay.bind),
            }
            .into());
        }
        if !relay.path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "relay.path",
                reason: "must start with '/'".to_string(),
            }
            .into());
        }
        if relay.allowed_origins.is_empty() {
            return Err(ConfigError::MissingField {
                field: "relay.allowed_origins",
            }
            .into());
        }
        for origin in &relay.allowed_origins {
            if HeaderValue::from_str(origin).is_err() || url::Url::parse(origin).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "relay.allowed_origins",
                    reason: format!("'{origin}' is not a valid origin"),
                }
                .into());
            }
        }
        if relay.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.keep_alive_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let consumer = &self.consumer;
        if url::Url::parse(&consumer.endpoint).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "consumer.endpoint",
                reason: format!("'{}' is not a URL", consumer.endpoint),
            }
            .into());
        }
        if consumer.max_items == 0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.max_items",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if consumer.dedup_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.dedup_window_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if consumer.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.cleanup_interval_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if consumer.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.base_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if consumer.max_delay_ms < consumer.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "consumer.max_delay_ms",
                reason: "must be >= base_delay_ms".to_string(),
            }
            .into());
        }
        if consumer.network_max_attempts == 0 || consumer.other_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.max_attempts",
                reason: "attempt budgets must be greater than 0".to_string(),
            }
            .into());
        }

        if let Some(endpoint) = &self.source.endpoint {
            if url::Url::parse(endpoint).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: "source.endpoint",
                    reason: format!("'{endpoint}' is not a URL"),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
