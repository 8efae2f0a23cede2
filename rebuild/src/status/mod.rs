//! Publication of human readable run status labels.

mod base;
mod log;
mod memory;

pub use base::StatusSink;
pub use log::LogStatusSink;
pub use memory::{MemoryStatusSink, StatusEntry};
