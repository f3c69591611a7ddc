//! Relay endpoint configuration.

use serde::Deserialize;

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Socket address the relay listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route serving the push stream.
    #[serde(default = "default_path")]
    pub path: String,
    /// Origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Positions behind the tail a fresh connection starts at.
    #[serde(default = "default_backlog")]
    pub backlog: u64,
    /// Interval between keep-alive comments on idle streams (seconds).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Pause before re-subscribing after a read pass that delivered nothing
    /// (milliseconds).
    #[serde(default = "default_idle_resubscribe_ms")]
    pub idle_resubscribe_ms: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

fn default_path() -> String {
    "/streams/oss/api/stream".into()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "https://vetpkg.dev".into(),
    ]
}

fn default_backlog() -> u64 {
    10
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_idle_resubscribe_ms() -> u64 {
    1000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
            allowed_origins: default_allowed_origins(),
            backlog: default_backlog(),
            keep_alive_secs: default_keep_alive_secs(),
            idle_resubscribe_ms: default_idle_resubscribe_ms(),
        }
    }
}
