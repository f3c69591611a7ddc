//! Transport-agnostic domain types.

mod frame;
mod package;
mod position;

pub use frame::{ControlMessage, PackageFrame, PushFrame};
pub use package::{normalize_ecosystem, Fingerprint, Package, PackageEvent};
pub use position::{RecordMetadata, StreamPosition, StreamRecord};
