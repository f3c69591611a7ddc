//! Resumable consumer configuration.

use std::time::Duration;

use serde::Deserialize;

/// `[consumer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// URL of the relay's push stream.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Maximum retained display items.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Trailing dedup window (seconds).
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Interval of the proactive dedup purge (seconds).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Delay before the first reconnect attempt (milliseconds).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on the reconnect delay (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Reconnect attempts after a network-level failure.
    #[serde(default = "default_network_max_attempts")]
    pub network_max_attempts: u32,
    /// Reconnect attempts after any other failure.
    #[serde(default = "default_other_max_attempts")]
    pub other_max_attempts: u32,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/streams/oss/api/stream".into()
}

fn default_max_items() -> usize {
    1000
}

fn default_dedup_window_secs() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_base_delay_ms() -> u64 {
    3000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_network_max_attempts() -> u32 {
    3
}

fn default_other_max_attempts() -> u32 {
    5
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_items: default_max_items(),
            dedup_window_secs: default_dedup_window_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            network_max_attempts: default_network_max_attempts(),
            other_max_attempts: default_other_max_attempts(),
        }
    }
}

impl ConsumerConfig {
    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    /// Dedup cleanup period, never shorter than one second.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        if self.cleanup_interval_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.cleanup_interval_secs)
        }
    }

    /// Reconnect delay for attempt number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Attempt budget for a failure class.
    #[must_use]
    pub const fn max_attempts(&self, network_level: bool) -> u32 {
        if network_level {
            self.network_max_attempts
        } else {
            self.other_max_attempts
        }
    }
}
