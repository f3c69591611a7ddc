//! Shared relay server state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::relay::{RelaySession, RelaySettings};
use crate::application::stream::ResilientLogReader;
use crate::domain::PackageEvent;
use crate::infrastructure::config::env_status::EnvStatus;
use crate::infrastructure::config::source::{ReaderOptions, StreamConfig};
use crate::port::LogClient;

/// A configured remote log.
#[derive(Clone)]
pub struct StreamSource {
    pub client: Arc<dyn LogClient>,
    pub config: StreamConfig,
    pub options: ReaderOptions,
}

impl StreamSource {
    pub fn new(client: Arc<dyn LogClient>, config: StreamConfig, options: ReaderOptions) -> Self {
        Self {
            client,
            config,
            options,
        }
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct Inner {
    source: Option<StreamSource>,
    env: EnvStatus,
    settings: RelaySettings,
    keep_alive: Duration,
    shutdown: CancellationToken,
}

/// State handed to every relay handler.
///
/// `source` is `None` when the environment lacks stream credentials; the
/// server still starts and answers each stream request with an error frame.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<Inner>,
}

impl RelayState {
    pub fn new(
        source: Option<StreamSource>,
        env: EnvStatus,
        settings: RelaySettings,
        keep_alive: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                env,
                settings,
                keep_alive,
                shutdown,
            }),
        }
    }

    /// A fresh session, or `None` without a configured source.
    #[must_use]
    pub fn session(&self) -> Option<RelaySession> {
        self.inner.source.as_ref().map(|source| {
            RelaySession::new(
                Arc::clone(&source.client),
                source.config.clone(),
                source.options,
                self.inner.settings,
            )
        })
    }

    /// A reader at the configured position, for health probes.
    #[must_use]
    pub fn reader(&self) -> Option<ResilientLogReader<PackageEvent>> {
        self.inner.source.as_ref().map(|source| {
            ResilientLogReader::new(
                Arc::clone(&source.client),
                source.config.clone(),
                source.options,
            )
        })
    }

    #[must_use]
    pub fn env(&self) -> &EnvStatus {
        &self.inner.env
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    /// Server-wide shutdown signal; every session listens on a child token.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}
