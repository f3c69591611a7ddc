//! Relay routes and CORS policy.

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use super::handler::{health, stream_events};
use super::state::RelayState;
use crate::infrastructure::config::relay::RelayConfig;

/// Build the relay router: the push stream at `config.path` and `/health`.
pub fn router(state: RelayState, config: &RelayConfig) -> Router {
    Router::new()
        .route(&config.path, get(stream_events))
        .route("/health", get(health))
        .layer(cors(&config.allowed_origins))
        .with_state(state)
}

/// CORS restricted to an origin allow-list.
fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers([header::CACHE_CONTROL])
}
