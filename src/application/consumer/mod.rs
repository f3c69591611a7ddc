//! Resumable consumer of the relay's push stream.
//!
//! Tracks the last delivered sequence number, filters recently seen
//! packages, bounds the retained item list and reconnects with backoff.

pub mod dedup;
pub mod runtime;
pub mod state;

pub use dedup::DedupCache;
pub use runtime::ConsumerHandle;
pub use state::{ConnectionState, ConsumerCore, ConsumerSnapshot, Directive, FrameOutcome};
