use std::fmt;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("missing environment variables: {}", .missing.join(", "))]
    MissingEnv { missing: Vec<String> },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Machine-readable classification of a remote log failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorCode {
    /// Tail check answered with a body that carries no position.
    InvalidTailResponse,
    /// Tail check failed for a transport reason.
    TailCheck,
    /// Requested position lies outside the log (HTTP 416).
    RangeNotSatisfiable,
    /// Credential rejected (HTTP 401).
    Unauthorized,
    /// Credential lacks access to the basin or stream (HTTP 403).
    Forbidden,
    /// Remote log is throttling this client (HTTP 429).
    RateLimited,
    /// Request did not complete in time.
    Timeout,
    /// DNS, TCP or TLS failure, or a connection dropped mid-body.
    Network,
    /// Remote log answered with a 5xx status.
    Server,
    /// Response did not follow the expected wire format.
    Protocol,
    /// Anything not matched above.
    Unknown,
}

impl StreamErrorCode {
    /// Upper-snake name used in logs and error frames.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTailResponse => "INVALID_TAIL_RESPONSE",
            Self::TailCheck => "TAIL_CHECK_ERROR",
            Self::RangeNotSatisfiable => "RANGE_NOT_SATISFIABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::Network => "NETWORK_ERROR",
            Self::Server => "SERVER_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Default retry disposition for this code.
    ///
    /// Positioning and credential failures will not fix themselves; every
    /// other condition is treated as transient.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::InvalidTailResponse
                | Self::RangeNotSatisfiable
                | Self::Unauthorized
                | Self::Forbidden
        )
    }

    /// Map an HTTP status returned by the remote log to a code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            408 => Self::Timeout,
            416 => Self::RangeNotSatisfiable,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport or protocol failure reported by the remote log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code})")]
pub struct StreamError {
    pub code: StreamErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl StreamError {
    /// Create an error whose retry disposition follows its code.
    pub fn new(code: StreamErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Create an error with an explicit retry disposition.
    pub fn with_retryable(code: StreamErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
        }
    }

    /// Classify a free-form failure message.
    ///
    /// Used for errors that arrive as text (for example an `error` event on
    /// the remote log's event stream) rather than as a typed status.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        let code = if lower.contains("416") || lower.contains("range not satisfiable") {
            StreamErrorCode::RangeNotSatisfiable
        } else if lower.contains("network") || lower.contains("connection") {
            StreamErrorCode::Network
        } else if lower.contains("timeout") || lower.contains("etimedout") {
            StreamErrorCode::Timeout
        } else if lower.contains("unauthorized") {
            StreamErrorCode::Unauthorized
        } else if lower.contains("forbidden") {
            StreamErrorCode::Forbidden
        } else if lower.contains("rate limit") || lower.contains("429") {
            StreamErrorCode::RateLimited
        } else {
            StreamErrorCode::Unknown
        };

        Self::new(code, message)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            StreamErrorCode::Timeout
        } else if err.is_connect() {
            StreamErrorCode::Network
        } else if let Some(status) = err.status() {
            StreamErrorCode::from_status(status.as_u16())
        } else if err.is_body() || err.is_request() {
            StreamErrorCode::Network
        } else if err.is_decode() {
            StreamErrorCode::Protocol
        } else {
            StreamErrorCode::Unknown
        };
        Self::new(code, err.to_string())
    }
}

/// Kind of non-data entry found on the remote log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Current tail position marker.
    Tail,
    /// Head position marker.
    Head,
    /// Metadata without a payload.
    Metadata,
}

impl ControlKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tail => "tail",
            Self::Head => "head",
            Self::Metadata => "metadata",
        }
    }
}

/// Outcome of a log entry that did not decode into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Expected protocol signalling; never an error condition for callers.
    #[error("stream {} marker received", .kind.as_str())]
    Control { kind: ControlKind },

    /// Malformed payload; the record is skipped.
    #[error("failed to parse record: {message}")]
    Parse { message: String },
}

impl DecodeError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(self, Self::Control { .. })
    }
}

/// Failure of a client-side push connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established (DNS, TCP, TLS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The established connection broke while reading the body.
    #[error("connection interrupted: {0}")]
    Io(String),

    /// The relay answered with a non-success HTTP status.
    #[error("relay responded with status {0}")]
    Status(u16),

    /// The relay ended the stream.
    #[error("stream closed by relay")]
    Closed,

    /// The response was not an event stream.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the failure happened below HTTP (the transport itself is gone).
    ///
    /// Network-level failures get a smaller reconnect budget than failures
    /// where the relay was reachable but refused or ended the stream.
    #[must_use]
    pub const fn is_network_level(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Io(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_connect() || err.is_timeout() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Io(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, Error>;
