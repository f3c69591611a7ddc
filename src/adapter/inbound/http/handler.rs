//! Relay HTTP handlers.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::{info_span, warn, Instrument};

use super::state::RelayState;
use crate::application::relay::STREAM_ERROR_MESSAGE;
use crate::application::stream::StreamHealth;
use crate::domain::{ControlMessage, PushFrame};
use crate::infrastructure::config::env_status::EnvStatus;

/// Query string of the push stream endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "fromSequence")]
    pub from_sequence: Option<String>,
}

/// Parse the resume token. An empty value counts as absent.
///
/// # Errors
///
/// Returns a message when the value is not an unsigned integer.
pub fn parse_from_sequence(raw: Option<&str>) -> Result<Option<u64>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("invalid fromSequence '{value}'")),
    }
}

/// `GET <relay path>[?fromSequence=N]`: the push stream.
pub async fn stream_events(
    State(state): State<RelayState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let from_sequence = match parse_from_sequence(query.from_sequence.as_deref()) {
        Ok(from_sequence) => from_sequence,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let (tx, rx) = mpsc::channel::<PushFrame>(1);
    let cancel = state.shutdown().child_token();

    match state.session() {
        Some(session) => {
            let span = info_span!("relay", connection_id = %session.id());
            tokio::spawn(
                session
                    .run(from_sequence, tx, cancel.clone())
                    .instrument(span),
            );
        }
        None => {
            warn!("Stream requested but source is not configured");
            tokio::spawn(async move {
                if tx.send(ControlMessage::connected().into()).await.is_ok() {
                    let _ = tx.send(ControlMessage::error(STREAM_ERROR_MESSAGE).into()).await;
                }
            });
        }
    }

    let frames = FrameStream {
        rx,
        _guard: cancel.drop_guard(),
    };
    let events = frames.filter_map(|frame| async move {
        match frame.to_json() {
            Ok(json) => Some(Ok::<_, Infallible>(Event::default().data(json))),
            Err(err) => {
                warn!(error = %err, "Failed to encode frame");
                None
            }
        }
    });

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive())),
    )
        .into_response()
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub env: EnvStatus,
    pub source: &'static str,
    pub stream: Option<StreamHealth>,
}

/// `GET /health`: environment readiness plus a stream probe.
pub async fn health(State(state): State<RelayState>) -> Json<HealthReport> {
    let stream = match state.reader() {
        Some(reader) => Some(reader.health_status().await),
        None => None,
    };

    Json(HealthReport {
        env: state.env().clone(),
        source: state.env().source_description(),
        stream,
    })
}

/// Frames from one session. Dropping it (client disconnect) cancels the
/// session.
struct FrameStream {
    rx: mpsc::Receiver<PushFrame>,
    _guard: DropGuard,
}

impl Stream for FrameStream {
    type Item = PushFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
