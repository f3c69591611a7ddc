//! Relay use case: turn a log subscription into a push stream per client.

pub mod session;

pub use session::{start_sequence, RelaySession, RelaySettings, SessionEnd, STREAM_ERROR_MESSAGE};
