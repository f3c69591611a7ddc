//! Positions within the remote log and the records decoded at them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A point in the remote log.
///
/// Sequence numbers are strictly increasing per log. A position names the
/// point to resume reading *after*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    /// Sequence number assigned by the log on append.
    #[serde(alias = "seqNum")]
    pub seq_num: u64,
    /// Append time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl StreamPosition {
    #[must_use]
    pub const fn new(seq_num: u64, timestamp: u64) -> Self {
        Self { seq_num, timestamp }
    }

    /// The first sequence number strictly after this position.
    #[must_use]
    pub const fn next_seq_num(&self) -> u64 {
        self.seq_num.saturating_add(1)
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.seq_num, self.timestamp)
    }
}

/// Everything on a log entry other than its payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMetadata {
    /// Sequence number, when the entry carried one.
    pub seq_num: Option<u64>,
    /// Best-effort append timestamp in milliseconds.
    pub timestamp: Option<u64>,
    /// Remaining non-payload fields, verbatim.
    pub fields: Map<String, Value>,
}

/// One decoded log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord<T> {
    pub payload: T,
    pub metadata: RecordMetadata,
}

impl<T> StreamRecord<T> {
    /// Position of the record, if the entry carried a sequence number.
    #[must_use]
    pub fn position(&self) -> Option<StreamPosition> {
        self.metadata
            .seq_num
            .map(|seq_num| StreamPosition::new(seq_num, self.metadata.timestamp.unwrap_or(0)))
    }

    #[must_use]
    pub fn seq_num(&self) -> Option<u64> {
        self.metadata.seq_num
    }

    /// Replace the payload, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StreamRecord<U> {
        StreamRecord {
            payload: f(self.payload),
            metadata: self.metadata,
        }
    }
}
