//! Remote log source configuration.
//!
//! Credentials and stream coordinates come from the environment; the TOML
//! `[source]` section only names which variables to read and how to reach
//! the log. All env lookups go through a caller-supplied function so tests
//! never touch the process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::port::ReadRequest;

pub const START_SEQ_NUM_ENV: &str = "S2_START_SEQ_NUM";
pub const START_TIMESTAMP_ENV: &str = "S2_START_TIMESTAMP";
pub const TAIL_OFFSET_ENV: &str = "S2_TAIL_OFFSET";
pub const MAX_RETRIES_ENV: &str = "S2_MAX_RETRIES";
pub const BASE_RETRY_DELAY_ENV: &str = "S2_BASE_RETRY_DELAY";
pub const TIMEOUT_ENV: &str = "S2_TIMEOUT";
pub const ENDPOINT_ENV: &str = "S2_ENDPOINT";

/// Encoding of record bodies requested from the remote log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Bodies arrive as UTF-8 text.
    #[default]
    Text,
    /// Bodies arrive base64-encoded and are decoded to bytes.
    Base64,
}

impl RecordFormat {
    /// Value of the `s2-format` request header.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::Text => "raw",
            Self::Base64 => "base64",
        }
    }
}

/// `[source]` section: where the remote log lives and which env vars hold
/// its credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Env var holding the access token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    /// Env var holding the basin name.
    #[serde(default = "default_basin_env")]
    pub basin_env: String,
    /// Env var holding the stream name.
    #[serde(default = "default_stream_env")]
    pub stream_env: String,
    /// Base URL override. When unset, `S2_ENDPOINT` is consulted, then the
    /// per-basin cloud endpoint is used.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Record body encoding.
    #[serde(default)]
    pub format: RecordFormat,
}

fn default_access_token_env() -> String {
    "S2_ACCESS_TOKEN".into()
}

fn default_basin_env() -> String {
    "S2_BASIN".into()
}

fn default_stream_env() -> String {
    "S2_STREAM".into()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            access_token_env: default_access_token_env(),
            basin_env: default_basin_env(),
            stream_env: default_stream_env(),
            endpoint: None,
            format: RecordFormat::default(),
        }
    }
}

impl SourceConfig {
    /// Names of the three required variables, in report order.
    #[must_use]
    pub fn required_vars(&self) -> [&str; 3] {
        [
            self.access_token_env.as_str(),
            self.basin_env.as_str(),
            self.stream_env.as_str(),
        ]
    }

    /// Resolve the endpoint override from config, then environment.
    pub fn endpoint_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.endpoint
            .clone()
            .or_else(|| non_empty(&lookup, ENDPOINT_ENV))
    }
}

/// Coordinates and starting position of one stream read.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub access_token: String,
    pub basin: String,
    pub stream: String,
    pub start_seq_num: Option<u64>,
    pub start_timestamp: Option<u64>,
    pub tail_offset: Option<u64>,
    /// Bounded batch size; `None` keeps streaming.
    pub batch_size: Option<u64>,
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("access_token", &"<redacted>")
            .field("basin", &self.basin)
            .field("stream", &self.stream)
            .field("start_seq_num", &self.start_seq_num)
            .field("start_timestamp", &self.start_timestamp)
            .field("tail_offset", &self.tail_offset)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl StreamConfig {
    pub fn new(
        access_token: impl Into<String>,
        basin: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            basin: basin.into(),
            stream: stream.into(),
            start_seq_num: None,
            start_timestamp: None,
            tail_offset: None,
            batch_size: None,
        }
    }

    /// Build from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] when any required variable is
    /// unset or empty, and [`ConfigError::InvalidValue`] when an optional
    /// positioning variable is not an unsigned integer.
    pub fn from_env(source: &SourceConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(source, |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::from_env`].
    pub fn from_lookup<F>(source: &SourceConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = non_empty(&lookup, &source.access_token_env);
        let basin = non_empty(&lookup, &source.basin_env);
        let stream = non_empty(&lookup, &source.stream_env);

        let (access_token, basin, stream) = match (access_token, basin, stream) {
            (Some(token), Some(basin), Some(stream)) => (token, basin, stream),
            _ => {
                return Err(ConfigError::MissingEnv {
                    missing: missing_vars(source, &lookup),
                })
            }
        };

        Ok(Self {
            access_token,
            basin,
            stream,
            start_seq_num: parse_var(&lookup, START_SEQ_NUM_ENV)?,
            start_timestamp: parse_var(&lookup, START_TIMESTAMP_ENV)?,
            tail_offset: parse_var(&lookup, TAIL_OFFSET_ENV)?,
            batch_size: None,
        })
    }

    /// Copy of this config positioned at `seq_num`.
    #[must_use]
    pub fn starting_at(&self, seq_num: u64) -> Self {
        Self {
            start_seq_num: Some(seq_num),
            ..self.clone()
        }
    }

    /// Copy of this config reading at most `count` records.
    #[must_use]
    pub fn with_batch_size(&self, count: u64) -> Self {
        Self {
            batch_size: Some(count),
            ..self.clone()
        }
    }

    /// Build a read request.
    ///
    /// Positioning precedence: sequence number, then timestamp, then tail
    /// offset, then none (the log's default).
    #[must_use]
    pub fn read_request(&self) -> ReadRequest {
        let mut request = ReadRequest {
            stream: self.stream.clone(),
            basin: self.basin.clone(),
            count: self.batch_size,
            ..ReadRequest::default()
        };

        if let Some(seq_num) = self.start_seq_num {
            request.seq_num = Some(seq_num);
        } else if let Some(timestamp) = self.start_timestamp {
            request.timestamp = Some(timestamp);
        } else if let Some(offset) = self.tail_offset {
            request.tail_offset = Some(offset);
        }

        request
    }
}

/// Retry and timeout behavior of the resilient reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_retry_delay: Duration,
    /// Advisory deadline for establishing one read call.
    pub timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(30000),
        }
    }
}

impl ReaderOptions {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when an override is not an
    /// unsigned integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ReaderOptions::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            max_retries: parse_var(&lookup, MAX_RETRIES_ENV)?.unwrap_or(defaults.max_retries),
            base_retry_delay: parse_var::<u64, _>(&lookup, BASE_RETRY_DELAY_ENV)?
                .map_or(defaults.base_retry_delay, Duration::from_millis),
            timeout: parse_var::<u64, _>(&lookup, TIMEOUT_ENV)?
                .map_or(defaults.timeout, Duration::from_millis),
        })
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_retry_delay.saturating_mul(factor)
    }
}

/// Required variables that are unset or empty, in report order.
pub fn missing_vars<F>(source: &SourceConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    source
        .required_vars()
        .into_iter()
        .filter(|name| non_empty(&lookup, name).is_none())
        .map(str::to_string)
        .collect()
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name,
                reason: e.to_string(),
            }),
    }
}
