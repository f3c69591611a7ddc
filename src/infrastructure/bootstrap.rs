//! Infrastructure bootstrap helpers for runtime wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::adapter::inbound::http::{RelayState, StreamSource};
use crate::adapter::outbound::s2::S2Client;
use crate::adapter::outbound::sse::HttpPushTransport;
use crate::application::consumer::ConsumerHandle;
use crate::application::relay::RelaySettings;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::env_status::EnvStatus;
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::config::source::{ReaderOptions, StreamConfig};
use crate::port::LogClient;

/// Build the remote log source from the process environment.
///
/// Returns `Ok(None)` when required credentials are missing; the relay
/// still starts in that case and reports the gap on every request.
///
/// # Errors
///
/// Returns an error if a positioning or retry variable is malformed, or the
/// endpoint override is not a URL.
#[allow(clippy::result_large_err)]
pub fn build_stream_source(config: &Config) -> Result<Option<StreamSource>> {
    build_stream_source_with(config, |name| std::env::var(name).ok())
}

/// Build the remote log source from an arbitrary variable lookup.
///
/// # Errors
///
/// See [`build_stream_source`].
#[allow(clippy::result_large_err)]
pub fn build_stream_source_with<F>(config: &Config, lookup: F) -> Result<Option<StreamSource>>
where
    F: Fn(&str) -> Option<String>,
{
    let stream = match StreamConfig::from_lookup(&config.source, &lookup) {
        Ok(stream) => stream,
        Err(ConfigError::MissingEnv { missing }) => {
            warn!(missing = %missing.join(", "), "Stream source not configured");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let options = ReaderOptions::from_lookup(&lookup)?;

    let mut client = S2Client::new(stream.access_token.clone(), &options)
        .with_format(config.source.format);
    if let Some(endpoint) = config.source.endpoint_with(&lookup) {
        let endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::InvalidValue {
            field: "source.endpoint",
            reason: e.to_string(),
        })?;
        info!(endpoint = %endpoint, "Using endpoint override");
        client = client.with_endpoint(endpoint);
    }

    info!(
        basin = %stream.basin,
        stream = %stream.stream,
        max_retries = options.max_retries,
        "Stream source configured"
    );

    let client: Arc<dyn LogClient> = Arc::new(client);
    Ok(Some(StreamSource::new(client, stream, options)))
}

/// Relay session settings from the `[relay]` section.
#[must_use]
pub fn relay_settings(config: &Config) -> RelaySettings {
    RelaySettings {
        backlog: config.relay.backlog,
        idle_resubscribe: Duration::from_millis(config.relay.idle_resubscribe_ms),
    }
}

/// Build the shared relay state.
///
/// # Errors
///
/// See [`build_stream_source`].
#[allow(clippy::result_large_err)]
pub fn build_relay_state(config: &Config, shutdown: CancellationToken) -> Result<RelayState> {
    let source = build_stream_source(config)?;
    Ok(RelayState::new(
        source,
        EnvStatus::check(&config.source),
        relay_settings(config),
        Duration::from_secs(config.relay.keep_alive_secs),
        shutdown,
    ))
}

/// Spawn a consumer of the relay at `endpoint` (defaults to
/// `consumer.endpoint`).
///
/// # Errors
///
/// Returns an error if the endpoint is not an absolute URL.
#[allow(clippy::result_large_err)]
pub fn spawn_consumer(
    config: &Config,
    endpoint: Option<&str>,
    from_sequence: Option<u64>,
) -> Result<ConsumerHandle> {
    let endpoint = endpoint.unwrap_or(&config.consumer.endpoint);
    let transport = HttpPushTransport::new(endpoint)?;
    info!(endpoint = %endpoint, from_sequence = ?from_sequence, "Starting consumer");

    Ok(ConsumerHandle::spawn_from(
        Arc::new(transport),
        config.consumer.clone(),
        from_sequence,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_missing_credentials_yield_no_source() {
        let source = build_stream_source_with(&Config::default(), env(&[])).unwrap();
        assert!(source.is_none());
    }

    #[test]
    fn test_complete_env_builds_source() {
        let source = build_stream_source_with(
            &Config::default(),
            env(&[
                ("S2_ACCESS_TOKEN", "token"),
                ("S2_BASIN", "packages"),
                ("S2_STREAM", "npm"),
                ("S2_START_SEQ_NUM", "12"),
                ("S2_MAX_RETRIES", "7"),
            ]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(source.config.basin, "packages");
        assert_eq!(source.config.start_seq_num, Some(12));
        assert_eq!(source.options.max_retries, 7);
    }

    #[test]
    fn test_malformed_positioning_is_an_error() {
        let err = build_stream_source_with(
            &Config::default(),
            env(&[
                ("S2_ACCESS_TOKEN", "token"),
                ("S2_BASIN", "packages"),
                ("S2_STREAM", "npm"),
                ("S2_TAIL_OFFSET", "lots"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_endpoint_is_an_error() {
        let err = build_stream_source_with(
            &Config::default(),
            env(&[
                ("S2_ACCESS_TOKEN", "token"),
                ("S2_BASIN", "packages"),
                ("S2_STREAM", "npm"),
                ("S2_ENDPOINT", "not a url"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue {
                field: "source.endpoint",
                ..
            })
        ));
    }

    #[test]
    fn test_relay_settings_follow_config() {
        let mut config = Config::default();
        config.relay.backlog = 25;
        config.relay.idle_resubscribe_ms = 250;

        let settings = relay_settings(&config);
        assert_eq!(settings.backlog, 25);
        assert_eq!(settings.idle_resubscribe, Duration::from_millis(250));
    }
}
