//! Resilient log reader.
//!
//! Wraps a [`LogClient`] with retry, backoff, control-message filtering and
//! tail lookup. Records are produced by a background task into a channel of
//! capacity one, so the task runs at most one record ahead of its consumer;
//! dropping or closing the [`RecordStream`] cancels the task.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::decoder::decode;
use crate::domain::{StreamPosition, StreamRecord};
use crate::error::{DecodeError, StreamError, StreamErrorCode};
use crate::infrastructure::config::source::{ReaderOptions, StreamConfig};
use crate::port::{LogClient, RawEntry, ReadResult};

/// Item yielded by a [`RecordStream`].
pub type RecordResult<T> = Result<StreamRecord<T>, StreamError>;

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHealth {
    pub healthy: bool,
    pub message: String,
    pub last_checked: DateTime<Utc>,
}

/// Reader over one stream, yielding records whose payload decodes as `T`.
pub struct ResilientLogReader<T> {
    client: Arc<dyn LogClient>,
    config: StreamConfig,
    options: ReaderOptions,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for ResilientLogReader<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            options: self.options,
            _payload: PhantomData,
        }
    }
}

impl<T> ResilientLogReader<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(client: Arc<dyn LogClient>, config: StreamConfig, options: ReaderOptions) -> Self {
        Self {
            client,
            config,
            options,
            _payload: PhantomData,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Current tail of the stream.
    ///
    /// # Errors
    ///
    /// Fails with [`StreamErrorCode::InvalidTailResponse`] (not retryable)
    /// when the answer carries no position, and with
    /// [`StreamErrorCode::TailCheck`] (retryable) when the call itself fails.
    pub async fn stream_tail(&self) -> Result<StreamPosition, StreamError> {
        let body = self
            .client
            .check_tail(&self.config.basin, &self.config.stream)
            .await
            .map_err(|err| {
                StreamError::with_retryable(
                    StreamErrorCode::TailCheck,
                    format!("failed to check stream tail: {}", err.message),
                    true,
                )
            })?;

        body.get("tail")
            .cloned()
            .and_then(|tail| serde_json::from_value::<StreamPosition>(tail).ok())
            .ok_or_else(|| {
                StreamError::new(
                    StreamErrorCode::InvalidTailResponse,
                    format!("invalid tail response from stream: {body}"),
                )
            })
    }

    /// Start reading from the configured position.
    ///
    /// Must be called inside a Tokio runtime. The returned stream ends when
    /// the log ends a bounded read, and yields one `Err` before ending when
    /// a failure is not retryable or retries are exhausted.
    #[must_use]
    pub fn read_stream(&self) -> RecordStream<T> {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let pump = Pump {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            options: self.options,
            tx,
            last_seq_num: None,
            delivered: false,
        };

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => trace!("Reader cancelled"),
                () = pump.run() => {}
            }
        });

        RecordStream { rx, cancel }
    }

    /// First record at the configured position, or `None` if the read
    /// ended without one.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the read.
    pub async fn read_single_record(&self) -> Result<Option<StreamRecord<T>>, StreamError> {
        let mut records = self.read_stream();
        let first = records.next().await.transpose();
        records.close();
        first
    }

    /// Look up the tail, then read from it.
    ///
    /// # Errors
    ///
    /// Returns the tail lookup error.
    pub async fn read_from_tail(&self) -> Result<RecordStream<T>, StreamError> {
        let tail = self.stream_tail().await?;
        debug!(seq_num = tail.seq_num, "Reading from tail");
        Ok(self.read_from_seq_num(tail.seq_num))
    }

    /// Read from `seq_num` with an otherwise identical reader.
    #[must_use]
    pub fn read_from_seq_num(&self, seq_num: u64) -> RecordStream<T> {
        let reader: Self = Self::new(
            Arc::clone(&self.client),
            self.config.starting_at(seq_num),
            self.options,
        );
        reader.read_stream()
    }

    /// Whether a bounded one-record read succeeds.
    pub async fn test_connection(&self) -> bool {
        let request = self.config.with_batch_size(1).read_request();
        match self.client.read(request).await {
            Ok(_) => true,
            Err(err) => {
                error!(error = %err, "Stream connection test failed");
                false
            }
        }
    }

    /// Probe the stream. Never fails; failures are reported in the result.
    pub async fn health_status(&self) -> StreamHealth {
        let healthy = self.test_connection().await;
        StreamHealth {
            healthy,
            message: if healthy {
                "S2 stream is healthy".to_string()
            } else {
                "S2 stream connection failed".to_string()
            },
            last_checked: Utc::now(),
        }
    }
}

/// How one read call ended without an error.
enum ReadEnd {
    /// The log ended the read.
    Finished,
    /// The consumer went away.
    Abandoned,
}

/// Background producer behind a [`RecordStream`].
struct Pump<T> {
    client: Arc<dyn LogClient>,
    config: StreamConfig,
    options: ReaderOptions,
    tx: mpsc::Sender<RecordResult<T>>,
    /// Last sequence number handed to the consumer.
    last_seq_num: Option<u64>,
    /// Whether a record was delivered since the last failure.
    delivered: bool,
}

impl<T> Pump<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn run(mut self) {
        let mut retries: u32 = 0;

        loop {
            self.delivered = false;
            let err = match self.read_once().await {
                Ok(ReadEnd::Finished | ReadEnd::Abandoned) => return,
                Err(err) => err,
            };

            if self.delivered {
                retries = 0;
            }
            retries += 1;

            if !err.retryable || retries > self.options.max_retries {
                error!(
                    code = %err.code,
                    error = %err.message,
                    attempts = retries,
                    "Stream read failed"
                );
                let _ = self.tx.send(Err(err)).await;
                return;
            }

            let delay = self.options.retry_delay(retries);
            warn!(
                code = %err.code,
                error = %err.message,
                attempt = retries,
                max_attempts = self.options.max_retries + 1,
                delay_ms = delay.as_millis() as u64,
                "Stream error, retrying"
            );
            sleep(delay).await;

            if let Some(seq_num) = self.last_seq_num {
                self.config = self.config.starting_at(seq_num.saturating_add(1));
            }
        }
    }

    async fn read_once(&mut self) -> Result<ReadEnd, StreamError> {
        match self.client.read(self.config.read_request()).await? {
            ReadResult::Stream(mut entries) => {
                while let Some(entry) = entries.next().await {
                    if !self.deliver(&entry?).await {
                        return Ok(ReadEnd::Abandoned);
                    }
                }
            }
            ReadResult::Batch(entries) => {
                for entry in &entries {
                    if !self.deliver(entry).await {
                        return Ok(ReadEnd::Abandoned);
                    }
                }
            }
        }
        Ok(ReadEnd::Finished)
    }

    /// Decode and forward one entry. Returns `false` once the consumer is gone.
    async fn deliver(&mut self, entry: &RawEntry) -> bool {
        match decode::<T>(entry) {
            Ok(record) => {
                let seq_num = record.seq_num();
                if self.tx.send(Ok(record)).await.is_err() {
                    return false;
                }
                if seq_num.is_some() {
                    self.last_seq_num = seq_num;
                }
                self.delivered = true;
                true
            }
            Err(DecodeError::Control { kind }) => {
                trace!(kind = kind.as_str(), "Skipping control entry");
                true
            }
            Err(DecodeError::Parse { message }) => {
                warn!(error = %message, "Skipping unparseable record");
                true
            }
        }
    }
}

/// Records produced by a [`ResilientLogReader`].
pub struct RecordStream<T> {
    rx: mpsc::Receiver<RecordResult<T>>,
    cancel: CancellationToken,
}

impl<T> RecordStream<T> {
    /// Stop the producer. Further polls drain what is buffered, then end.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl<T> Stream for RecordStream<T> {
    type Item = RecordResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for RecordStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::testkit::domain::{record_entry, tail_body};
    use crate::testkit::log::{ScriptedLogClient, ScriptedRead};

    fn options() -> ReaderOptions {
        ReaderOptions {
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(30000),
        }
    }

    fn reader(client: &Arc<ScriptedLogClient>) -> ResilientLogReader<Value> {
        ResilientLogReader::new(
            Arc::clone(client) as Arc<dyn LogClient>,
            StreamConfig::new("token", "basin", "packages"),
            options(),
        )
    }

    fn network_error() -> StreamError {
        StreamError::new(StreamErrorCode::Network, "connection reset")
    }

    #[tokio::test]
    async fn test_batch_skips_control_and_bad_records() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Batch(vec![
            record_entry(1, &json!({"n": 1})),
            RawEntry::Json(json!({"tail": {"seq_num": 2, "timestamp": 0}})),
            RawEntry::Json(json!("garbage")),
            record_entry(2, &json!({"n": 2})),
        ]));

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        let payloads: Vec<Value> = records.into_iter().map(|r| r.unwrap().payload).collect();
        assert_eq!(payloads, vec![json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(client.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Fail(network_error()));
        client.push_read(ScriptedRead::Fail(network_error()));
        client.push_read(ScriptedRead::Batch(vec![record_entry(5, &json!({}))]));

        let started = tokio::time::Instant::now();
        let records: Vec<_> = reader(&client).read_stream().collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(client.read_count(), 3);
        // 1000ms then 2000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success_yields_data() {
        let client = Arc::new(ScriptedLogClient::new());
        for _ in 0..3 {
            client.push_read(ScriptedRead::Fail(network_error()));
        }
        client.push_read(ScriptedRead::Batch(vec![record_entry(5, &json!({"n": 5}))]));

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().payload, json!({"n": 5}));
        assert_eq!(client.read_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let client = Arc::new(ScriptedLogClient::new());
        for _ in 0..4 {
            client.push_read(ScriptedRead::Fail(network_error()));
        }

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap_err().code, StreamErrorCode::Network);
        assert_eq!(client.read_count(), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Fail(StreamError::new(
            StreamErrorCode::RangeNotSatisfiable,
            "statusCode: 416",
        )));

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].as_ref().unwrap_err().retryable);
        assert_eq!(client.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resumes_after_last_delivered() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Stream(vec![
            Ok(record_entry(10, &json!({}))),
            Ok(record_entry(11, &json!({}))),
            Err(network_error()),
        ]));
        client.push_read(ScriptedRead::Batch(vec![record_entry(12, &json!({}))]));

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        let seqs: Vec<_> = records.iter().map(|r| r.as_ref().unwrap().seq_num()).collect();
        assert_eq!(seqs, vec![Some(10), Some(11), Some(12)]);

        let requests = client.requests();
        assert_eq!(requests[1].seq_num, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_resets_retry_budget() {
        let client = Arc::new(ScriptedLogClient::new());
        for seq in 0..5 {
            client.push_read(ScriptedRead::Stream(vec![
                Ok(record_entry(seq, &json!({}))),
                Err(network_error()),
            ]));
        }
        client.push_read(ScriptedRead::Batch(vec![]));

        let records: Vec<_> = reader(&client).read_stream().collect().await;
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_stream_tail() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_tail(Ok(tail_body(500)));
        let tail = reader(&client).stream_tail().await.unwrap();
        assert_eq!(tail.seq_num, 500);
    }

    #[tokio::test]
    async fn test_stream_tail_without_position_is_invalid() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_tail(Ok(json!({"position": 3})));
        let err = reader(&client).stream_tail().await.unwrap_err();
        assert_eq!(err.code, StreamErrorCode::InvalidTailResponse);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_stream_tail_transport_failure_is_retryable() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_tail(Err(StreamError::new(StreamErrorCode::Unauthorized, "401")));
        let err = reader(&client).stream_tail().await.unwrap_err();
        assert_eq!(err.code, StreamErrorCode::TailCheck);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_read_single_record() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Batch(vec![
            record_entry(1, &json!({"first": true})),
            record_entry(2, &json!({})),
        ]));
        let record = reader(&client).read_single_record().await.unwrap().unwrap();
        assert_eq!(record.payload, json!({"first": true}));

        client.push_read(ScriptedRead::Batch(vec![]));
        assert!(reader(&client).read_single_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_from_tail_positions_read() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_tail(Ok(tail_body(42)));
        client.push_read(ScriptedRead::Batch(vec![]));

        let records: Vec<_> = reader(&client).read_from_tail().await.unwrap().collect().await;
        assert!(records.is_empty());
        assert_eq!(client.requests()[0].seq_num, Some(42));
    }

    #[tokio::test]
    async fn test_health_status() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Batch(vec![]));
        let health = reader(&client).health_status().await;
        assert!(health.healthy);
        assert_eq!(client.requests()[0].count, Some(1));

        client.push_read(ScriptedRead::Fail(network_error()));
        let health = reader(&client).health_status().await;
        assert!(!health.healthy);
        assert_eq!(health.message, "S2 stream connection failed");
    }

    #[tokio::test]
    async fn test_close_stops_reading() {
        let client = Arc::new(ScriptedLogClient::new());
        client.push_read(ScriptedRead::Stream(vec![
            Ok(record_entry(1, &json!({}))),
            Ok(record_entry(2, &json!({}))),
            Ok(record_entry(3, &json!({}))),
        ]));

        let mut records = reader(&client).read_stream();
        let first = records.next().await.unwrap().unwrap();
        assert_eq!(first.seq_num(), Some(1));
        records.close();

        let rest: Vec<_> = records.collect().await;
        assert!(rest.len() <= 1);
    }
}
