//! Remote log port.
//!
//! The remote log is an append-only, sequence-numbered record store addressed
//! by basin and stream. The resilient reader depends only on this trait; the
//! S2 HTTP adapter implements it for production and the testkit scripts it
//! for tests.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::{Map, Value};

use crate::error::StreamError;

/// Parameters of one read call against the remote log.
///
/// At most one positioning field is meaningful; `count` absent means the
/// call keeps streaming instead of returning a bounded batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadRequest {
    pub stream: String,
    pub basin: String,
    pub seq_num: Option<u64>,
    pub timestamp: Option<u64>,
    pub tail_offset: Option<u64>,
    pub count: Option<u64>,
}

impl ReadRequest {
    /// Whether this request asks for continuous delivery.
    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        self.count.is_none()
    }
}

/// One entry as delivered by the remote log, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    /// Entry delivered as structured JSON.
    Json(Value),
    /// Entry whose body arrived as bytes, next to its JSON header fields.
    Binary {
        fields: Map<String, Value>,
        body: Vec<u8>,
    },
}

impl From<Value> for RawEntry {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Stream of raw entries from an incremental read.
pub type EntryStream = BoxStream<'static, Result<RawEntry, StreamError>>;

/// Result of a read call.
pub enum ReadResult {
    /// Incremental delivery; entries arrive until the stream ends or fails.
    Stream(EntryStream),
    /// One finite batch.
    Batch(Vec<RawEntry>),
}

impl std::fmt::Debug for ReadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ReadResult::Stream(..)"),
            Self::Batch(entries) => f
                .debug_tuple("ReadResult::Batch")
                .field(&entries.len())
                .finish(),
        }
    }
}

/// Client for the remote log.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Issue one read call.
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StreamError>;

    /// Ask the log for its current tail.
    ///
    /// Returns the raw response body; validating its shape is the caller's
    /// concern.
    async fn check_tail(&self, basin: &str, stream: &str) -> Result<Value, StreamError>;
}
