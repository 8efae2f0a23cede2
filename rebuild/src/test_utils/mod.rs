//! Utilities for testing the rebuild without spawning processes.

pub mod catalog;
pub mod runner;
