//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use std::time::Duration;

use crate::application::relay::RelaySettings;
use crate::infrastructure::config::consumer::ConsumerConfig;
use crate::infrastructure::config::source::{ReaderOptions, StreamConfig};

/// Stream coordinates with placeholder credentials.
pub fn stream_config() -> StreamConfig {
    StreamConfig::new("test-token", "test-basin", "packages")
}

/// Reader options with short, deterministic backoff.
pub fn reader_options() -> ReaderOptions {
    ReaderOptions {
        max_retries: 3,
        base_retry_delay: Duration::from_millis(10),
        timeout: Duration::from_millis(1000),
    }
}

/// Relay settings with the production backlog and a short idle wait.
pub fn relay_settings() -> RelaySettings {
    RelaySettings {
        backlog: 10,
        idle_resubscribe: Duration::from_millis(50),
    }
}

/// Consumer config with the production budgets and delays.
pub fn consumer() -> ConsumerConfig {
    ConsumerConfig::default()
}
