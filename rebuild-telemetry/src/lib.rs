//! Logging and metrics setup shared by the rebuild binary and tests.

pub mod metrics;
pub mod tracing;
