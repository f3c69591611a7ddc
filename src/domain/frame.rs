//! Frames carried on the relay's push stream.
//!
//! Each frame is one `data: <json>` unit of a `text/event-stream` response.
//! A frame is either a control message (tagged by `type`) or a package
//! record augmented with its log position.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::package::PackageEvent;
use super::position::StreamRecord;

/// Protocol signalling on the push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Sent once, immediately after the relay accepts a connection.
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Sent once before the relay closes the stream on failure.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Informational notice.
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Liveness signal.
    Keepalive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
}

impl ControlMessage {
    #[must_use]
    pub const fn connected() -> Self {
        Self::Connected { message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Some(message.into()),
        }
    }
}

/// A package record as delivered to push clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFrame {
    #[serde(flatten)]
    pub event: PackageEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(
        rename = "sequenceNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sequence_number: Option<u64>,
}

impl From<StreamRecord<PackageEvent>> for PackageFrame {
    fn from(record: StreamRecord<PackageEvent>) -> Self {
        Self {
            event: record.payload,
            timestamp: record.metadata.timestamp,
            sequence_number: record.metadata.seq_num,
        }
    }
}

/// Any frame on the push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushFrame {
    Control(ControlMessage),
    Package(PackageFrame),
}

impl PushFrame {
    /// Parse the payload of one `data:` line.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is neither a known control message
    /// nor a package record.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Encode as the JSON payload of one `data:` line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ControlMessage> for PushFrame {
    fn from(message: ControlMessage) -> Self {
        Self::Control(message)
    }
}

impl From<PackageFrame> for PushFrame {
    fn from(frame: PackageFrame) -> Self {
        Self::Package(frame)
    }
}
