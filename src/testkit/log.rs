//! Mock [`LogClient`] for testing.
//!
//! [`ScriptedLogClient`] pops one [`ScriptedRead`] per `read()` call and one
//! tail result per `check_tail()` call. When the read queue is exhausted it
//! answers with a stream that never yields (a quiet tail); when the tail
//! queue is exhausted it answers with tail `0`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use super::domain::tail_body;
use crate::error::StreamError;
use crate::port::{LogClient, RawEntry, ReadRequest, ReadResult};

/// Outcome of one scripted `read()` call.
pub enum ScriptedRead {
    /// A finite batch.
    Batch(Vec<RawEntry>),
    /// A stream that yields these items, then ends.
    Stream(Vec<Result<RawEntry, StreamError>>),
    /// A stream that yields these entries, then stays open without data.
    Open(Vec<RawEntry>),
    /// A stream fed on demand through a channel; ends when the sender drops.
    Channel(mpsc::UnboundedReceiver<Result<RawEntry, StreamError>>),
    /// The call itself fails.
    Fail(StreamError),
}

/// A log client with scripted read and tail results.
pub struct ScriptedLogClient {
    reads: Mutex<VecDeque<ScriptedRead>>,
    tails: Mutex<VecDeque<Result<Value, StreamError>>>,
    requests: Mutex<Vec<ReadRequest>>,
    read_count: Arc<AtomicU32>,
    tail_count: Arc<AtomicU32>,
}

impl ScriptedLogClient {
    pub fn new() -> Self {
        Self {
            reads: Mutex::new(VecDeque::new()),
            tails: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            read_count: Arc::new(AtomicU32::new(0)),
            tail_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn push_read(&self, read: ScriptedRead) {
        self.reads.lock().unwrap().push_back(read);
    }

    pub fn push_tail(&self, tail: Result<Value, StreamError>) {
        self.tails.lock().unwrap().push_back(tail);
    }

    /// Queue a channel-fed stream and return its feeding end.
    pub fn push_channel(&self) -> mpsc::UnboundedSender<Result<RawEntry, StreamError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_read(ScriptedRead::Channel(rx));
        tx
    }

    /// Every read request received so far, in order.
    pub fn requests(&self) -> Vec<ReadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn tail_count(&self) -> u32 {
        self.tail_count.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedLogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogClient for ScriptedLogClient {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StreamError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let next = self.reads.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| ScriptedRead::Open(Vec::new())) {
            ScriptedRead::Batch(entries) => Ok(ReadResult::Batch(entries)),
            ScriptedRead::Stream(items) => Ok(ReadResult::Stream(stream::iter(items).boxed())),
            ScriptedRead::Open(entries) => Ok(ReadResult::Stream(
                stream::iter(entries.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
            )),
            ScriptedRead::Channel(rx) => Ok(ReadResult::Stream(
                stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
                    .boxed(),
            )),
            ScriptedRead::Fail(err) => Err(err),
        }
    }

    async fn check_tail(&self, _basin: &str, _stream: &str) -> Result<Value, StreamError> {
        self.tail_count.fetch_add(1, Ordering::SeqCst);
        self.tails
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(tail_body(0)))
    }
}
