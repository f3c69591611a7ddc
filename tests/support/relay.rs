//! Relay fixtures: router state over a scripted log, and an SSE body reader.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use pkgstream::adapter::inbound::http::{RelayState, StreamSource};
use pkgstream::adapter::outbound::sse::SseDecoder;
use pkgstream::infrastructure::config::env_status::EnvStatus;
use pkgstream::infrastructure::config::relay::RelayConfig;
use pkgstream::infrastructure::config::source::SourceConfig;
use pkgstream::port::LogClient;
use pkgstream::testkit::config::{reader_options, relay_settings, stream_config};
use pkgstream::testkit::log::ScriptedLogClient;

pub const STREAM_PATH: &str = "/streams/oss/api/stream";

pub fn relay_config() -> RelayConfig {
    RelayConfig::default()
}

/// State backed by `client`, with every required variable reported present.
pub fn configured_state(client: &Arc<ScriptedLogClient>) -> RelayState {
    let source = StreamSource::new(
        Arc::clone(client) as Arc<dyn LogClient>,
        stream_config(),
        reader_options(),
    );
    RelayState::new(
        Some(source),
        EnvStatus::from_lookup(&SourceConfig::default(), |_| Some("set".to_string())),
        relay_settings(),
        Duration::from_secs(15),
        CancellationToken::new(),
    )
}

/// State with no stream credentials.
pub fn unconfigured_state() -> RelayState {
    RelayState::new(
        None,
        EnvStatus::from_lookup(&SourceConfig::default(), |_| None),
        relay_settings(),
        Duration::from_secs(15),
        CancellationToken::new(),
    )
}

/// Read `count` data frames from an event-stream response, parsed as JSON.
///
/// Stops early when the body ends. Panics if the frames do not arrive within
/// five seconds.
pub async fn read_frames(response: Response<Body>, count: usize) -> Vec<Value> {
    let mut body = response.into_body();
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();

    let collect = async {
        while frames.len() < count {
            let Some(frame) = body.frame().await else {
                break;
            };
            let frame = frame.expect("body frame");
            let Some(data) = frame.data_ref() else {
                continue;
            };
            for event in decoder.feed(data) {
                if event.is_message() {
                    frames.push(serde_json::from_str(&event.data).expect("frame json"));
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("frames in time");

    frames
}

/// Read a whole (finite) response body as JSON.
pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
