//! Mock [`PushTransport`] implementations for testing.
//!
//! - [`ScriptedTransport`] pops one [`ScriptedConnection`] per `open()`
//!   call and records the resume cursor it was asked for. When the queue is
//!   exhausted every `open()` is refused with a network-level error.
//! - [`ScriptedConnection::Channel`] gives tests on-demand frame delivery.
//! - [`ScriptedConnection::Hang`] never finishes opening.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::port::{PushConnection, PushTransport};

/// Outcome of one scripted `open()` call.
pub enum ScriptedConnection {
    /// The connection cannot be established.
    Refuse(TransportError),
    /// Yields `frames`, then fails with `then`, or stays open silently when
    /// `then` is `None`.
    Frames {
        frames: Vec<String>,
        then: Option<TransportError>,
    },
    /// Frames fed through a channel; the connection closes when the sender
    /// drops.
    Channel(mpsc::UnboundedReceiver<Result<String, TransportError>>),
    /// `open()` never resolves, like a relay that swallows the handshake.
    Hang,
}

impl ScriptedConnection {
    /// Yields `frames` and stays open.
    pub fn open(frames: Vec<String>) -> Self {
        Self::Frames { frames, then: None }
    }

    /// Yields `frames`, then the relay closes the stream.
    pub fn closing(frames: Vec<String>) -> Self {
        Self::Frames {
            frames,
            then: Some(TransportError::Closed),
        }
    }

    /// Refused below HTTP.
    pub fn unreachable() -> Self {
        Self::Refuse(TransportError::Connect("connection refused".into()))
    }
}

/// A push transport with scripted connections.
pub struct ScriptedTransport {
    connections: Mutex<VecDeque<ScriptedConnection>>,
    opened: Mutex<Vec<Option<u64>>>,
    open_count: Arc<AtomicU32>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
            open_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_connections(connections: Vec<ScriptedConnection>) -> Self {
        let transport = Self::new();
        transport.connections.lock().unwrap().extend(connections);
        transport
    }

    pub fn push(&self, connection: ScriptedConnection) {
        self.connections.lock().unwrap().push_back(connection);
    }

    /// Queue a channel-fed connection and return its feeding end.
    pub fn push_channel(&self) -> mpsc::UnboundedSender<Result<String, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedConnection::Channel(rx));
        tx
    }

    /// Resume cursor passed to each `open()` call, in order.
    pub fn opened_from(&self) -> Vec<Option<u64>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn open(&self, from_sequence: Option<u64>) -> Result<Box<dyn PushConnection>, TransportError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().unwrap().push(from_sequence);

        let next = self.connections.lock().unwrap().pop_front();
        match next.unwrap_or_else(ScriptedConnection::unreachable) {
            ScriptedConnection::Refuse(err) => Err(err),
            ScriptedConnection::Frames { frames, then } => Ok(Box::new(FrameConnection {
                frames: frames.into(),
                then,
            })),
            ScriptedConnection::Channel(rx) => Ok(Box::new(ChannelConnection { rx })),
            ScriptedConnection::Hang => std::future::pending().await,
        }
    }
}

struct FrameConnection {
    frames: VecDeque<String>,
    then: Option<TransportError>,
}

#[async_trait]
impl PushConnection for FrameConnection {
    async fn next_frame(&mut self) -> Result<String, TransportError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match self.then.take() {
            Some(err) => Err(err),
            None => std::future::pending().await,
        }
    }
}

struct ChannelConnection {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl PushConnection for ChannelConnection {
    async fn next_frame(&mut self) -> Result<String, TransportError> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}
