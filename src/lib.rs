//! Pkgstream - live package-publish stream relay.
//!
//! Package registries publish "version released" events into a hosted
//! append-only log. This crate reads that log resiliently, relays it to
//! clients as a Server-Sent Events push stream with resume support, and
//! provides a resumable consumer for that push stream.
//!
//! # Architecture
//!
//! - **Reader** - [`application::stream::ResilientLogReader`] follows one log
//!   stream, decodes entries into typed records, skips control and malformed
//!   entries, and retries with exponential backoff from the last delivered
//!   position.
//! - **Relay** - [`application::relay::RelaySession`] turns a reader into a
//!   per-client push stream starting a few records behind the tail, or right
//!   after a client-supplied sequence number.
//! - **Consumer** - [`application::consumer::ConsumerHandle`] connects to the
//!   relay, deduplicates packages within a trailing window, keeps a bounded
//!   item list, and reconnects with backoff from its last sequence number.
//!
//! # Modules
//!
//! - [`adapter`] - S2 log client, SSE transport, axum relay server, CLI
//! - [`application`] - Reader, relay session and consumer use cases
//! - [`domain`] - Positions, records, package events and push frames
//! - [`error`] - Error types for the crate
//! - [`infrastructure`] - Configuration loading and runtime wiring
//! - [`port`] - Traits separating use cases from transports
//!
//! # Features
//!
//! - `testkit` - Scripted log client and push transport for tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pkgstream::adapter::outbound::s2::S2Client;
//! use pkgstream::application::stream::ResilientLogReader;
//! use pkgstream::domain::PackageEvent;
//! use pkgstream::infrastructure::config::source::{ReaderOptions, SourceConfig, StreamConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::from_env(&SourceConfig::default())?;
//! let options = ReaderOptions::from_env()?;
//! let client = Arc::new(S2Client::new(config.access_token.clone(), &options));
//! let reader: ResilientLogReader<PackageEvent> = ResilientLogReader::new(client, config, options);
//!
//! let tail = reader.stream_tail().await?;
//! println!("next sequence number: {}", tail.seq_num);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
