//! Builders for log entries, package events and push frames used across
//! tests.

use serde_json::{json, Value};

use crate::domain::{PackageEvent, PackageFrame};
use crate::port::RawEntry;

/// Timestamp stamped on built entries: `1_717_000_000_000 + seq_num`.
pub fn timestamp_for(seq_num: u64) -> u64 {
    1_717_000_000_000 + seq_num
}

/// An npm publish event.
pub fn npm(name: &str, version: &str) -> PackageEvent {
    PackageEvent::new("ECOSYSTEM_NPM", name, version)
}

/// A JSON log entry whose `body` holds `payload` as JSON text.
pub fn record_entry(seq_num: u64, payload: &Value) -> RawEntry {
    RawEntry::Json(json!({
        "seq_num": seq_num,
        "timestamp": timestamp_for(seq_num),
        "body": payload.to_string(),
    }))
}

/// A log entry carrying a package event.
pub fn package_entry(seq_num: u64, event: &PackageEvent) -> RawEntry {
    let payload = serde_json::to_value(event).unwrap();
    record_entry(seq_num, &payload)
}

/// Tail-check response body for `seq_num`.
pub fn tail_body(seq_num: u64) -> Value {
    json!({ "tail": { "seq_num": seq_num, "timestamp": timestamp_for(seq_num) } })
}

/// A package frame as the relay would send it.
pub fn package_frame(seq_num: u64, event: PackageEvent) -> PackageFrame {
    PackageFrame {
        event,
        timestamp: Some(timestamp_for(seq_num)),
        sequence_number: Some(seq_num),
    }
}

/// JSON text of a package frame.
pub fn package_frame_json(seq_num: u64, name: &str, version: &str) -> String {
    serde_json::to_string(&package_frame(seq_num, npm(name, version))).unwrap()
}

/// JSON text of the `connected` control frame.
pub fn connected_json() -> String {
    r#"{"type":"connected"}"#.to_string()
}
