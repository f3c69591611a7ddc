//! Consumer state machine.
//!
//! [`ConsumerCore`] owns the connection state, resume cursor, attempt
//! counter, dedup cache and bounded item list. It performs no I/O: the
//! runtime feeds it transport events and carries out the [`Directive`]s it
//! returns.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::dedup::DedupCache;
use crate::domain::{ControlMessage, Fingerprint, PackageFrame, PushFrame};
use crate::error::TransportError;
use crate::infrastructure::config::consumer::ConsumerConfig;

pub const PARSE_ERROR_MESSAGE: &str = "Error parsing stream data";
pub const NETWORK_FAILED_MESSAGE: &str =
    "Network connection lost. Please check your internet connection and reconnect.";
pub const RETRIES_EXHAUSTED_MESSAGE: &str =
    "Failed to reconnect after multiple attempts. Please reconnect manually.";

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    ManuallyDisconnected,
    Failed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::ManuallyDisconnected => "manually_disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the consumer exposes to its user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSnapshot {
    pub state: ConnectionState,
    pub packages_received: u64,
    pub duplicates_filtered: u64,
    pub last_sequence: Option<u64>,
    pub status_message: Option<String>,
    pub items: usize,
}

/// Action the runtime must take next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Open a connection resuming after `from_sequence`.
    Open { from_sequence: Option<u64> },
    /// Wait `delay`, then report back via [`ConsumerCore::on_reconnect_due`].
    Reconnect {
        delay: Duration,
        attempt: u32,
        max_attempts: u32,
    },
    /// Stop; only a manual connect resumes.
    GiveUp,
    /// Nothing to do.
    Idle,
}

/// Result of one received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A new package, appended to the item list.
    Accepted(PackageFrame),
    /// A package seen within the dedup window.
    Duplicate(Fingerprint),
    /// A control frame.
    Control,
    /// The relay reported an error.
    RelayError(String),
    /// The frame could not be parsed.
    Malformed,
    /// Frame arrived while no connection should be live.
    Ignored,
}

#[derive(Debug)]
pub struct ConsumerCore {
    config: ConsumerConfig,
    state: ConnectionState,
    status_message: Option<String>,
    attempts: u32,
    last_sequence: Option<u64>,
    packages_received: u64,
    duplicates_filtered: u64,
    dedup: DedupCache,
    items: VecDeque<PackageFrame>,
}

impl ConsumerCore {
    #[must_use]
    pub fn new(config: ConsumerConfig) -> Self {
        let dedup = DedupCache::new(config.dedup_window());
        Self {
            items: VecDeque::with_capacity(config.max_items.min(1024)),
            config,
            state: ConnectionState::Idle,
            status_message: None,
            attempts: 0,
            last_sequence: None,
            packages_received: 0,
            duplicates_filtered: 0,
            dedup,
        }
    }

    /// Seed the resume cursor, as if `sequence` had already been delivered.
    #[must_use]
    pub fn with_resume_cursor(mut self, sequence: Option<u64>) -> Self {
        self.last_sequence = sequence;
        self
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Retained items, oldest first.
    pub fn items(&self) -> impl Iterator<Item = &PackageFrame> {
        self.items.iter()
    }

    #[must_use]
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    #[must_use]
    pub fn snapshot(&self) -> ConsumerSnapshot {
        ConsumerSnapshot {
            state: self.state,
            packages_received: self.packages_received,
            duplicates_filtered: self.duplicates_filtered,
            last_sequence: self.last_sequence,
            status_message: self.status_message.clone(),
            items: self.items.len(),
        }
    }

    /// Initial connect. Does nothing unless the consumer is idle.
    pub fn start(&mut self) -> Directive {
        if self.state != ConnectionState::Idle {
            return Directive::Idle;
        }
        self.open()
    }

    /// User-initiated connect: clears a manual disconnect or a terminal
    /// failure and starts over with a fresh attempt budget.
    pub fn connect(&mut self) -> Directive {
        info!(from_sequence = ?self.last_sequence, "Manual connect");
        self.attempts = 0;
        self.status_message = None;
        self.open()
    }

    /// User-initiated disconnect: suppresses reconnects until [`connect`].
    ///
    /// [`connect`]: Self::connect
    pub fn disconnect(&mut self) {
        info!("Manual disconnect");
        self.state = ConnectionState::ManuallyDisconnected;
        self.status_message = None;
        self.attempts = 0;
    }

    /// A scheduled reconnect delay elapsed.
    pub fn on_reconnect_due(&mut self) -> Directive {
        if self.state != ConnectionState::Reconnecting {
            return Directive::Idle;
        }
        info!(
            attempt = self.attempts,
            from_sequence = ?self.last_sequence,
            "Attempting to reconnect"
        );
        self.open()
    }

    fn open(&mut self) -> Directive {
        self.state = ConnectionState::Connecting;
        Directive::Open {
            from_sequence: self.last_sequence,
        }
    }

    /// Handle the payload of one `data:` frame received at `now`.
    pub fn on_frame(&mut self, data: &str, now: Instant) -> FrameOutcome {
        if matches!(
            self.state,
            ConnectionState::ManuallyDisconnected | ConnectionState::Failed | ConnectionState::Idle
        ) {
            return FrameOutcome::Ignored;
        }

        let frame = match PushFrame::parse(data) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "Error parsing stream data");
                self.status_message = Some(PARSE_ERROR_MESSAGE.to_string());
                return FrameOutcome::Malformed;
            }
        };

        if self.state != ConnectionState::Open {
            debug!("Push stream open");
            self.state = ConnectionState::Open;
            self.attempts = 0;
            self.status_message = None;
        }

        match frame {
            PushFrame::Control(ControlMessage::Error { message }) => {
                let message = message.unwrap_or_else(|| "Stream error".to_string());
                warn!(message = %message, "Relay reported an error");
                self.status_message = Some(message.clone());
                FrameOutcome::RelayError(message)
            }
            PushFrame::Control(control) => {
                trace!(?control, "Control frame");
                FrameOutcome::Control
            }
            PushFrame::Package(package) => self.accept(package, now),
        }
    }

    fn accept(&mut self, package: PackageFrame, now: Instant) -> FrameOutcome {
        if let Some(sequence) = package.sequence_number {
            self.last_sequence = Some(sequence);
        }

        let fingerprint = package.event.fingerprint();
        if self.dedup.check_and_insert(&fingerprint, now) {
            self.duplicates_filtered += 1;
            debug!(fingerprint = %fingerprint, "Filtered duplicate package");
            return FrameOutcome::Duplicate(fingerprint);
        }

        self.packages_received += 1;
        let limit = self.config.max_items.max(1);
        while self.items.len() >= limit {
            self.items.pop_front();
        }
        self.items.push_back(package.clone());
        FrameOutcome::Accepted(package)
    }

    /// The connection failed or could not be opened.
    pub fn on_transport_error(&mut self, err: &TransportError) -> Directive {
        if matches!(
            self.state,
            ConnectionState::ManuallyDisconnected | ConnectionState::Failed | ConnectionState::Idle
        ) {
            return Directive::Idle;
        }

        self.attempts += 1;
        let network_level = err.is_network_level();
        let max_attempts = self.config.max_attempts(network_level);

        if self.attempts <= max_attempts {
            let delay = self.config.reconnect_delay(self.attempts);
            self.state = ConnectionState::Reconnecting;
            self.status_message = Some(format!(
                "Connection lost - reconnecting in {}s (attempt {}/{})...",
                delay.as_secs_f64(),
                self.attempts,
                max_attempts
            ));
            warn!(
                error = %err,
                network_level,
                attempt = self.attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Push connection lost, scheduling reconnect"
            );
            Directive::Reconnect {
                delay,
                attempt: self.attempts,
                max_attempts,
            }
        } else {
            self.state = ConnectionState::Failed;
            self.status_message = Some(
                if network_level {
                    NETWORK_FAILED_MESSAGE
                } else {
                    RETRIES_EXHAUSTED_MESSAGE
                }
                .to_string(),
            );
            warn!(error = %err, attempts = self.attempts, "Giving up on push connection");
            Directive::GiveUp
        }
    }

    /// Periodic dedup maintenance.
    pub fn purge(&mut self, now: Instant) -> usize {
        self.dedup.purge(now)
    }

    /// Release the dedup cache and items.
    pub fn close(&mut self) {
        self.dedup.close();
        self.items.clear();
    }
}
