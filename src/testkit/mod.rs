//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`log`]: Mock [`LogClient`](crate::port::LogClient): `ScriptedLogClient`.
//! - [`push`]: Mock [`PushTransport`](crate::port::PushTransport): `ScriptedTransport`.
//! - [`domain`]: Builders for log entries, package events and frames.
//! - [`config`]: Canonical test configurations.

pub mod config;
pub mod domain;
pub mod log;
pub mod push;
