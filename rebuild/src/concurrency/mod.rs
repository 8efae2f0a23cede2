//! Concurrency primitives shared by the coordinator and its callers.

pub mod shutdown;
