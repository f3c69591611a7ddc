//! Server-sent events: wire decoding and the relay push transport.

pub mod decoder;
pub mod transport;

pub use decoder::{SseDecoder, SseEvent};
pub use transport::HttpPushTransport;
