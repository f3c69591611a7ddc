//! S2 REST wire types.
//!
//! Records are kept as loose JSON: the decoder owns field interpretation,
//! and the log may add fields without breaking reads.
//!
//! Example batch body:
//! ```json
//! {"records":[{"seq_num":12,"timestamp":1717000000000,"headers":[],"body":"..."}],"tail":{"seq_num":13,"timestamp":1717000000001}}
//! ```

use serde::Deserialize;
use serde_json::Value;

/// Body of a bounded read, and of each `batch` event on a streaming read.
#[derive(Debug, Default, Deserialize)]
pub struct ReadBatch {
    #[serde(default)]
    pub records: Vec<Value>,
    /// Present when the read reached the current tail.
    #[serde(default)]
    pub tail: Option<Value>,
}

/// Body of a non-success response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(alias = "error")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best-effort message extraction from an error response body.
    pub fn message_from(body: &str) -> String {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|parsed| parsed.message)
            .unwrap_or_else(|| body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_with_tail() {
        let batch: ReadBatch = serde_json::from_str(
            r#"{"records":[{"seq_num":1,"body":"x"}],"tail":{"seq_num":2,"timestamp":0}}"#,
        )
        .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert!(batch.tail.is_some());
    }

    #[test]
    fn test_empty_batch() {
        let batch: ReadBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.tail.is_none());
    }

    #[test]
    fn test_error_body_message() {
        assert_eq!(ErrorBody::message_from(r#"{"message":"stream not found"}"#), "stream not found");
        assert_eq!(ErrorBody::message_from(r#"{"error":"denied"}"#), "denied");
        assert_eq!(ErrorBody::message_from("plain text\n"), "plain text");
    }
}
