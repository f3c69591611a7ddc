//! Infrastructure configuration modules.

pub mod consumer;
pub mod env_status;
pub mod logging;
pub mod relay;
pub mod settings;
pub mod source;
