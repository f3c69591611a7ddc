//! S2 REST client.
//!
//! Speaks the `v1` records API of an S2 basin:
//! - `GET {base}/streams/{stream}/records/tail` for the current tail
//! - `GET {base}/streams/{stream}/records` for reads, as a JSON batch when
//!   `count` is set and as an event stream (`batch`, `error`, `ping`) when
//!   it is not
//!
//! The base URL is `https://{basin}.b.aws.s2.dev/v1` unless an endpoint
//! override is configured, in which case the basin travels in the
//! `s2-basin` header instead.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};
use url::Url;

use super::dto::{ErrorBody, ReadBatch};
use crate::adapter::outbound::sse::{SseDecoder, SseEvent};
use crate::error::{StreamError, StreamErrorCode};
use crate::infrastructure::config::source::{ReaderOptions, RecordFormat};
use crate::port::{EntryStream, LogClient, RawEntry, ReadRequest, ReadResult};

const EVENT_STREAM: &str = "text/event-stream";
const BASIN_HEADER: &str = "s2-basin";
const FORMAT_HEADER: &str = "s2-format";

/// HTTP client for one S2 account.
pub struct S2Client {
    http: HttpClient,
    access_token: String,
    endpoint: Option<Url>,
    format: RecordFormat,
    timeout: Duration,
}

impl S2Client {
    /// Create a client authenticating with `access_token`.
    ///
    /// `options.timeout` bounds how long a read or tail call may take to
    /// produce response headers; streaming bodies are not cut off.
    #[must_use]
    pub fn new(access_token: impl Into<String>, options: &ReaderOptions) -> Self {
        Self {
            http: HttpClient::new(),
            access_token: access_token.into(),
            endpoint: None,
            format: RecordFormat::default(),
            timeout: options.timeout,
        }
    }

    /// Send every request to `endpoint` instead of the per-basin host.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    fn base_url(&self, basin: &str) -> Result<Url, StreamError> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(&format!("https://{basin}.b.aws.s2.dev/v1")).map_err(|e| {
                StreamError::new(
                    StreamErrorCode::Protocol,
                    format!("invalid basin '{basin}': {e}"),
                )
            }),
        }
    }

    /// `{base}/streams/{stream}/records[/{suffix}]`, with the stream name
    /// percent-encoded as a single path segment.
    pub fn records_url(
        &self,
        basin: &str,
        stream: &str,
        suffix: Option<&str>,
    ) -> Result<Url, StreamError> {
        let mut url = self.base_url(basin)?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                StreamError::new(StreamErrorCode::Protocol, "endpoint cannot be a base URL")
            })?;
            segments
                .pop_if_empty()
                .extend(["streams", stream, "records"]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    fn request(&self, url: Url, basin: &str) -> RequestBuilder {
        let builder = self.http.get(url).bearer_auth(&self.access_token);
        if self.endpoint.is_some() {
            builder.header(BASIN_HEADER, basin)
        } else {
            builder
        }
    }

    /// Send with the configured deadline on response headers.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, StreamError> {
        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| {
                StreamError::new(
                    StreamErrorCode::Timeout,
                    format!("request timed out after {}ms", self.timeout.as_millis()),
                )
            })??;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = ErrorBody::message_from(&body);
        Err(StreamError::new(
            StreamErrorCode::from_status(status.as_u16()),
            format!("statusCode: {} {message}", status.as_u16()),
        ))
    }
}

#[async_trait]
impl LogClient for S2Client {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StreamError> {
        let url = self.records_url(&request.basin, &request.stream, None)?;
        let mut builder = self
            .request(url, &request.basin)
            .header(FORMAT_HEADER, self.format.header_value())
            .query(&query_params(&request));

        let continuous = request.is_continuous();
        if continuous {
            builder = builder.header(ACCEPT, EVENT_STREAM);
        }

        debug!(
            stream = %request.stream,
            seq_num = ?request.seq_num,
            timestamp = ?request.timestamp,
            tail_offset = ?request.tail_offset,
            count = ?request.count,
            "Reading from S2"
        );
        let response = self.send(builder).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(EVENT_STREAM));

        if continuous && is_event_stream {
            return Ok(ReadResult::Stream(entry_stream(
                response.bytes_stream().boxed(),
                self.format,
            )));
        }

        let text = response.text().await?;
        let batch: ReadBatch = serde_json::from_str(&text).map_err(|e| {
            StreamError::new(
                StreamErrorCode::Protocol,
                format!("malformed read response: {e}"),
            )
        })?;
        Ok(ReadResult::Batch(batch_entries(batch, self.format)))
    }

    async fn check_tail(&self, basin: &str, stream: &str) -> Result<Value, StreamError> {
        let url = self.records_url(basin, stream, Some("tail"))?;
        let response = self.send(self.request(url, basin)).await?;
        let text = response.text().await?;
        // Shape validation belongs to the reader; an unparseable body becomes
        // `null` so it is reported as an invalid tail response.
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

fn query_params(request: &ReadRequest) -> Vec<(&'static str, u64)> {
    [
        ("seq_num", request.seq_num),
        ("timestamp", request.timestamp),
        ("tail_offset", request.tail_offset),
        ("count", request.count),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|value| (name, value)))
    .collect()
}

/// Convert one wire record into a raw entry, decoding base64 bodies.
fn record_entry(record: Value, format: RecordFormat) -> RawEntry {
    if format != RecordFormat::Base64 {
        return RawEntry::Json(record);
    }

    let Value::Object(mut fields) = record else {
        return RawEntry::Json(record);
    };

    let decoded = match fields.get("body") {
        Some(Value::String(encoded)) => STANDARD.decode(encoded),
        _ => return RawEntry::Json(Value::Object(fields)),
    };

    match decoded {
        Ok(body) => {
            fields.remove("body");
            RawEntry::Binary { fields, body }
        }
        Err(err) => {
            debug!(error = %err, "Record body is not valid base64");
            RawEntry::Json(Value::Object(fields))
        }
    }
}

/// Records of a batch, followed by a tail marker when the batch carries one.
fn batch_entries(batch: ReadBatch, format: RecordFormat) -> Vec<RawEntry> {
    let mut entries: Vec<RawEntry> = batch
        .records
        .into_iter()
        .map(|record| record_entry(record, format))
        .collect();
    if let Some(tail) = batch.tail {
        entries.push(RawEntry::Json(json!({ "tail": tail })));
    }
    entries
}

struct EventState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<RawEntry, StreamError>>,
    format: RecordFormat,
    finished: bool,
}

impl EventState {
    fn absorb(&mut self, event: SseEvent) {
        match event.event.as_deref() {
            Some("ping") => trace!("S2 ping"),
            Some("error") => {
                warn!(message = %event.data, "S2 reported a stream error");
                self.pending.push_back(Err(StreamError::classify(event.data)));
                self.finished = true;
            }
            None | Some("message" | "batch") => match serde_json::from_str::<Value>(&event.data) {
                Ok(value) if value.get("records").is_some() => {
                    match serde_json::from_value::<ReadBatch>(value) {
                        Ok(batch) => self
                            .pending
                            .extend(batch_entries(batch, self.format).into_iter().map(Ok)),
                        Err(err) => self.fail_protocol(&err),
                    }
                }
                Ok(record) => self.pending.push_back(Ok(record_entry(record, self.format))),
                Err(err) => self.fail_protocol(&err),
            },
            Some(other) => debug!(event = other, "Ignoring S2 event"),
        }
    }

    fn fail_protocol(&mut self, err: &serde_json::Error) {
        self.pending.push_back(Err(StreamError::new(
            StreamErrorCode::Protocol,
            format!("malformed batch event: {err}"),
        )));
        self.finished = true;
    }
}

/// Turn an S2 event-stream body into a stream of raw entries.
///
/// The stream ends after an `error` event or a body failure, each surfaced
/// as one `Err` item.
fn entry_stream(body: BoxStream<'static, reqwest::Result<Bytes>>, format: RecordFormat) -> EntryStream {
    let state = EventState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        format,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.feed(&chunk) {
                        state.absorb(event);
                    }
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(StreamError::from(err)));
                    state.finished = true;
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> S2Client {
        S2Client::new("token", &ReaderOptions::default())
    }

    fn body_of(chunks: Vec<&'static str>) -> BoxStream<'static, reqwest::Result<Bytes>> {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes())))).boxed()
    }

    #[test]
    fn test_default_records_url() {
        let url = client().records_url("my-basin", "packages", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://my-basin.b.aws.s2.dev/v1/streams/packages/records"
        );
    }

    #[test]
    fn test_tail_url_with_endpoint_override() {
        let client = client().with_endpoint(Url::parse("http://localhost:4243/v1/").unwrap());
        let url = client.records_url("b", "oss/packages", Some("tail")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4243/v1/streams/oss%2Fpackages/records/tail"
        );
    }

    #[test]
    fn test_query_params_skip_unset() {
        let request = ReadRequest {
            stream: "s".into(),
            basin: "b".into(),
            seq_num: Some(7),
            count: Some(1),
            ..ReadRequest::default()
        };
        assert_eq!(query_params(&request), vec![("seq_num", 7), ("count", 1)]);
    }

    #[test]
    fn test_base64_body_becomes_binary() {
        let entry = record_entry(
            json!({"seq_num": 3, "body": STANDARD.encode(br#"{"a":1}"#)}),
            RecordFormat::Base64,
        );
        match entry {
            RawEntry::Binary { fields, body } => {
                assert_eq!(fields.get("seq_num"), Some(&json!(3)));
                assert!(!fields.contains_key("body"));
                assert_eq!(body, br#"{"a":1}"#);
            }
            other => panic!("expected binary entry, got {other:?}"),
        }
    }

    #[test]
    fn test_text_format_keeps_json() {
        let record = json!({"seq_num": 3, "body": "hello"});
        assert_eq!(record_entry(record.clone(), RecordFormat::Text), RawEntry::Json(record));
    }

    #[test]
    fn test_batch_tail_becomes_marker() {
        let batch = ReadBatch {
            records: vec![json!({"seq_num": 1, "body": "x"})],
            tail: Some(json!({"seq_num": 2, "timestamp": 0})),
        };
        let entries = batch_entries(batch, RecordFormat::Text);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            RawEntry::Json(json!({"tail": {"seq_num": 2, "timestamp": 0}}))
        );
    }

    #[tokio::test]
    async fn test_event_stream_batches_and_pings() {
        let body = body_of(vec![
            "event: ping\ndata: {}\n\n",
            "event: batch\ndata: {\"records\":[{\"seq_num\":1,\"body\":\"a\"},",
            "{\"seq_num\":2,\"body\":\"b\"}]}\n\n",
        ]);
        let entries: Vec<_> = entry_stream(body, RecordFormat::Text).collect().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            Ok(RawEntry::Json(json!({"seq_num": 2, "body": "b"})))
        );
    }

    #[tokio::test]
    async fn test_event_stream_error_event_ends_stream() {
        let body = body_of(vec![
            "event: error\ndata: statusCode: 416 Range Not Satisfiable\n\n",
            "event: batch\ndata: {\"records\":[{\"seq_num\":9}]}\n\n",
        ]);
        let entries: Vec<_> = entry_stream(body, RecordFormat::Text).collect().await;
        assert_eq!(entries.len(), 1);
        let err = entries[0].clone().unwrap_err();
        assert_eq!(err.code, StreamErrorCode::RangeNotSatisfiable);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_event_stream_malformed_batch_is_protocol_error() {
        let body = body_of(vec!["event: batch\ndata: {not json\n\n"]);
        let entries: Vec<_> = entry_stream(body, RecordFormat::Text).collect().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].clone().unwrap_err().code, StreamErrorCode::Protocol);
    }
}
