//! Outbound adapters (driven side).

pub mod s2;
pub mod sse;
