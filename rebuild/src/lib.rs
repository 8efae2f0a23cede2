//! Coordinator of the front-end database rebuild.
//!
//! A rebuild runs every selected table through a fixed chain of external commands (gather,
//! convert, drop, create, load, clustering, indexing) while keeping a bounded number of commands
//! running per step type. Foreign keys are created once both referenced tables finished indexing
//! and comments are added once their table is done.
//!
//! The [`pipeline::Pipeline`] drives a run. It polls one [`commands::CommandPool`] per
//! [`step::StepType`], advances the per-table state machines held by the
//! [`state::TableTracker`] and releases foreign keys through the
//! [`state::DependencyResolver`].

pub mod catalog;
pub mod commands;
pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod state;
pub mod status;
pub mod step;
pub mod summary;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
