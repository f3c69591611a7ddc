//! Log entry decoding.
//!
//! Turns a [`RawEntry`] into a [`StreamRecord`], separating real records
//! from protocol signalling. Control entries (tail and head markers,
//! payload-less metadata) surface as [`DecodeError::Control`]; malformed
//! entries as [`DecodeError::Parse`]. Neither is fatal to a read.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domain::{RecordMetadata, StreamRecord};
use crate::error::{ControlKind, DecodeError};
use crate::port::RawEntry;

/// Fields that may carry the payload, in priority order.
const PAYLOAD_FIELDS: [&str; 3] = ["data", "payload", "body"];

/// Decode an entry and deserialize its payload into `T`.
///
/// # Errors
///
/// Returns [`DecodeError::Control`] for signalling entries and
/// [`DecodeError::Parse`] when the entry or its payload is malformed.
pub fn decode<T: DeserializeOwned>(entry: &RawEntry) -> Result<StreamRecord<T>, DecodeError> {
    let record = decode_value(entry)?;
    let payload = serde_json::from_value(record.payload)
        .map_err(|e| DecodeError::parse(format!("unexpected payload shape: {e}")))?;
    Ok(StreamRecord {
        payload,
        metadata: record.metadata,
    })
}

/// Decode an entry, leaving the payload as JSON.
///
/// Text payloads that hold JSON are parsed; other text passes through as a
/// JSON string. An entry with no payload field becomes its own payload.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_value(entry: &RawEntry) -> Result<StreamRecord<Value>, DecodeError> {
    match entry {
        RawEntry::Json(Value::Object(fields)) => {
            check_control(fields, has_payload_field(fields))?;

            let payload = PAYLOAD_FIELDS
                .iter()
                .find_map(|name| fields.get(*name))
                .map_or_else(|| Value::Object(fields.clone()), text_payload);

            Ok(StreamRecord {
                payload,
                metadata: metadata(fields),
            })
        }
        RawEntry::Json(_) => Err(DecodeError::parse("invalid record format")),
        RawEntry::Binary { fields, body } => {
            check_control(fields, true)?;

            let text = std::str::from_utf8(body)
                .map_err(|e| DecodeError::parse(format!("binary payload is not UTF-8: {e}")))?;
            let payload = serde_json::from_str(text)
                .map_err(|e| DecodeError::parse(format!("binary payload is not JSON: {e}")))?;

            Ok(StreamRecord {
                payload,
                metadata: metadata(fields),
            })
        }
    }
}

fn has_payload_field(fields: &Map<String, Value>) -> bool {
    PAYLOAD_FIELDS.iter().any(|name| fields.contains_key(*name))
}

fn check_control(fields: &Map<String, Value>, has_payload: bool) -> Result<(), DecodeError> {
    let kind = if fields.contains_key("tail") {
        Some(ControlKind::Tail)
    } else if fields.contains_key("head") {
        Some(ControlKind::Head)
    } else if fields.contains_key("metadata") && !has_payload {
        Some(ControlKind::Metadata)
    } else {
        None
    };

    match kind {
        Some(kind) => Err(DecodeError::Control { kind }),
        None => Ok(()),
    }
}

fn text_payload(raw: &Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| raw.clone()),
        other => other.clone(),
    }
}

fn metadata(fields: &Map<String, Value>) -> RecordMetadata {
    let seq_num = fields
        .get("seq_num")
        .or_else(|| fields.get("seqNum"))
        .and_then(as_u64);
    let timestamp = fields.get("timestamp").and_then(as_timestamp);

    let rest = fields
        .iter()
        .filter(|(name, _)| !PAYLOAD_FIELDS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    RecordMetadata {
        seq_num,
        timestamp,
        fields: rest,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Milliseconds since the epoch from a number, numeric string or RFC 3339
/// string.
fn as_timestamp(value: &Value) -> Option<u64> {
    as_u64(value).or_else(|| {
        let text = value.as_str()?;
        let parsed = chrono::DateTime::parse_from_rfc3339(text).ok()?;
        u64::try_from(parsed.timestamp_millis()).ok()
    })
}
