//! One relay connection.
//!
//! A session announces itself with a `connected` frame, resolves where to
//! start (just after the client's resume token, or a small backlog before
//! the tail), then repeatedly subscribes to the log from its cursor and
//! forwards each package record. A subscription that ends is replaced by a
//! fresh one at the cursor; a subscription that fails produces one `error`
//! frame and ends the session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::application::stream::ResilientLogReader;
use crate::domain::{ControlMessage, PackageEvent, PackageFrame, PushFrame};
use crate::error::StreamError;
use crate::infrastructure::config::source::{ReaderOptions, StreamConfig};
use crate::port::LogClient;

/// Message of the `error` frame sent before a failed session closes.
pub const STREAM_ERROR_MESSAGE: &str = "Stream error";

/// Relay-wide session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Records replayed before the tail for a client without a resume token.
    pub backlog: u64,
    /// Pause before re-subscribing after a subscription delivered nothing.
    pub idle_resubscribe: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            backlog: 10,
            idle_resubscribe: Duration::from_millis(1000),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away or the session was cancelled.
    Disconnected,
    /// The log failed; an `error` frame was sent.
    Failed(StreamError),
}

/// First sequence number to deliver.
///
/// With a resume token `n` this is `n + 1`; without one it is
/// `max(1, tail - backlog)`.
#[must_use]
pub fn start_sequence(from_sequence: Option<u64>, tail: u64, backlog: u64) -> u64 {
    match from_sequence {
        Some(last_seen) => last_seen.saturating_add(1),
        None => tail.saturating_sub(backlog).max(1),
    }
}

/// State of one relay connection.
pub struct RelaySession {
    id: Uuid,
    client: Arc<dyn LogClient>,
    config: StreamConfig,
    options: ReaderOptions,
    settings: RelaySettings,
}

impl RelaySession {
    pub fn new(
        client: Arc<dyn LogClient>,
        config: StreamConfig,
        options: ReaderOptions,
        settings: RelaySettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            config,
            options,
            settings,
        }
    }

    /// Connection identifier carried in this session's logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    fn reader_at(&self, seq_num: u64) -> ResilientLogReader<PackageEvent> {
        ResilientLogReader::new(
            Arc::clone(&self.client),
            self.config.starting_at(seq_num),
            self.options,
        )
    }

    async fn resolve_start(&self, from_sequence: Option<u64>) -> Result<u64, StreamError> {
        let tail = match from_sequence {
            Some(_) => 0,
            None => {
                let reader: ResilientLogReader<PackageEvent> = ResilientLogReader::new(
                    Arc::clone(&self.client),
                    self.config.clone(),
                    self.options,
                );
                reader.stream_tail().await?.seq_num
            }
        };
        Ok(start_sequence(from_sequence, tail, self.settings.backlog))
    }

    /// Drive the session until the client leaves, `cancel` fires, or the
    /// log fails.
    ///
    /// Frames go to `sink`; the session ends when `sink` is closed.
    pub async fn run(
        self,
        from_sequence: Option<u64>,
        sink: mpsc::Sender<PushFrame>,
        cancel: CancellationToken,
    ) -> SessionEnd {
        let outcome = tokio::select! {
            () = cancel.cancelled() => SessionEnd::Disconnected,
            outcome = self.pump(from_sequence, &sink) => outcome,
        };

        match &outcome {
            SessionEnd::Disconnected => debug!("Relay session ended by client"),
            SessionEnd::Failed(err) => {
                error!(code = %err.code, error = %err.message, "Relay session failed");
                if sink
                    .send(ControlMessage::error(STREAM_ERROR_MESSAGE).into())
                    .await
                    .is_err()
                {
                    trace!("Client gone before error frame");
                }
            }
        }
        outcome
    }

    async fn pump(&self, from_sequence: Option<u64>, sink: &mpsc::Sender<PushFrame>) -> SessionEnd {
        if sink.send(ControlMessage::connected().into()).await.is_err() {
            return SessionEnd::Disconnected;
        }

        let mut cursor = match self.resolve_start(from_sequence).await {
            Ok(start) => start,
            Err(err) => return SessionEnd::Failed(err),
        };
        info!(from_sequence = ?from_sequence, start = cursor, "Relay session started");

        loop {
            let mut records = self.reader_at(cursor).read_stream();
            let mut delivered = 0_u64;

            while let Some(item) = records.next().await {
                let record = match item {
                    Ok(record) => record,
                    Err(err) => return SessionEnd::Failed(err),
                };

                if let Some(seq_num) = record.seq_num() {
                    if seq_num < cursor {
                        trace!(seq_num, cursor, "Skipping already delivered record");
                        continue;
                    }
                    cursor = seq_num.saturating_add(1);
                }

                let frame = PackageFrame::from(record);
                if sink.send(frame.into()).await.is_err() {
                    return SessionEnd::Disconnected;
                }
                delivered += 1;
            }

            debug!(cursor, delivered, "Subscription ended, re-subscribing");
            if delivered == 0 {
                sleep(self.settings.idle_resubscribe).await;
            }
            if sink.is_closed() {
                return SessionEnd::Disconnected;
            }
        }
    }
}
