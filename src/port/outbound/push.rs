//! Push transport port used by the resumable consumer.

use async_trait::async_trait;

use crate::error::TransportError;

/// Opens push connections to the relay.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection, resuming after `from_sequence` when given.
    async fn open(&self, from_sequence: Option<u64>) -> Result<Box<dyn PushConnection>, TransportError>;
}

/// One open push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Wait for the payload of the next `data:` frame.
    ///
    /// Returns [`TransportError::Closed`] once the relay ends the stream.
    async fn next_frame(&mut self) -> Result<String, TransportError>;
}
