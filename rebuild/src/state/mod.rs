//! Per-table progress of a rebuild.
//!
//! Every table walks through the same ordered stages. A stage without commands is skipped and the
//! clustering branch only exists for tables declaring a clustering index:
//!
//! ```text
//! NotStarted -> Gathering -> Converting -> Dropping -> Creating -> Loading
//!                                                                    |
//!                     +----------------------------------------------+
//!                     |                                              |
//!                     v                                              |
//!            ClusteredIndexing -> Clustering -> Optimizing           |
//!                                                   |                |
//!                                                   v                v
//!                                               Indexing <-----------+
//!                                                   |
//!                                                   v
//!                                                 Done
//! ```
//!
//! Reaching `Done` makes the table eligible as a foreign key target and schedules its comments.
//! Foreign keys wait in the [`DependencyResolver`] until both tables they relate are done.

pub mod foreign_keys;
pub mod table;
pub mod tracker;

pub use foreign_keys::{DependencyResolver, PendingForeignKey};
pub use table::{Stage, TableRecord};
pub use tracker::{SoftCommand, TableTracker, TrackerContext};
