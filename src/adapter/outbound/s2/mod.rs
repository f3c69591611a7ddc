//! S2 stream store integration.

pub mod client;
pub mod dto;

pub use client::S2Client;
