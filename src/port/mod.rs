//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! # Available Ports
//!
//! - [`LogClient`] - Remote append-only log (read calls and tail checks)
//! - [`PushTransport`], [`PushConnection`] - Client side of the relay's push stream

pub mod outbound;

pub use outbound::log::{EntryStream, LogClient, RawEntry, ReadRequest, ReadResult};
pub use outbound::push::{PushConnection, PushTransport};
