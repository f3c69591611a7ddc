//! Reading the remote log: entry decoding and the resilient reader.

pub mod decoder;
pub mod reader;

pub use decoder::{decode, decode_value};
pub use reader::{RecordResult, RecordStream, ResilientLogReader, StreamHealth};
