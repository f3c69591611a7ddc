//! Handlers for `pkgstream check`.

use std::path::Path;

use serde_json::json;

use super::output;
use crate::application::stream::ResilientLogReader;
use crate::domain::PackageEvent;
use crate::error::{Error, Result};
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::env_status::{EnvStatus, Readiness};
use crate::infrastructure::config::settings::{Config, DEFAULT_CONFIG_FILE};

/// Report which stream credentials are present. Fails unless all are set.
pub fn execute_env(config: &Config) -> Result<()> {
    let status = EnvStatus::check(&config.source);

    if output::is_json() {
        output::json_output(json!({
            "command": "check.env",
            "status": status,
            "source": status.source_description(),
        }));
    } else {
        output::section("Environment");
        for name in config.source.required_vars() {
            let present = !status.missing.iter().any(|missing| missing == name);
            output::field(name, if present { "set" } else { "missing" });
        }
        output::field("Readiness", status.readiness.as_str());
    }

    match status.readiness {
        Readiness::Configured => {
            output::success(status.source_description());
            Ok(())
        }
        Readiness::Partial | Readiness::Missing => {
            output::error(&format!(
                "Missing environment variables: {}",
                status.missing.join(", ")
            ));
            Err(Error::Connection(format!(
                "stream source {}",
                status.readiness.as_str()
            )))
        }
    }
}

/// Validate the configuration file. `config` was already loaded by the
/// caller, so reaching this point means it parsed and validated.
pub fn execute_config(config: &Config, path: Option<&Path>) -> Result<()> {
    let shown = path.map_or_else(
        || {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                DEFAULT_CONFIG_FILE.to_string()
            } else {
                "(defaults)".to_string()
            }
        },
        |path| path.display().to_string(),
    );

    if output::is_json() {
        output::json_output(json!({
            "command": "check.config",
            "status": "valid",
            "path": shown,
        }));
        return Ok(());
    }

    output::section("Configuration");
    output::field("File", &shown);
    output::field("Relay", format!("{}{}", config.relay.bind, config.relay.path));
    output::field("Consumer", &config.consumer.endpoint);
    output::success("Configuration is valid");
    Ok(())
}

/// Probe the remote log with a single-record read.
pub async fn execute_health(config: &Config) -> Result<()> {
    let Some(source) = bootstrap::build_stream_source(config)? else {
        output::error("Stream source not configured");
        output::hint("run `pkgstream check env` to see which variables are missing");
        return Err(Error::Connection("stream source not configured".to_string()));
    };

    let reader: ResilientLogReader<PackageEvent> =
        ResilientLogReader::new(source.client, source.config, source.options);
    let health = reader.health_status().await;

    if output::is_json() {
        output::json_output(json!({
            "command": "check.health",
            "health": health,
        }));
    } else {
        output::section("Stream Health");
        output::field("Basin", &reader.config().basin);
        output::field("Stream", &reader.config().stream);
        output::field("Checked", health.last_checked.to_rfc3339());
    }

    if health.healthy {
        output::success(&health.message);
        Ok(())
    } else {
        output::error(&health.message);
        Err(Error::Connection(health.message))
    }
}
