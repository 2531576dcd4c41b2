//! Translation of SDK records into wire messages.
//!
//! Nothing in here performs I/O. Every function is a pure mapping from the
//! records handed over by the SDK to the generated protobuf types, so the same
//! input always produces the same output.

pub mod attributes;
pub mod group;
pub mod ids;
pub mod jaeger;
pub mod logs;
pub mod time;
