//! Shared configuration types for the rebuild coordinator.

mod base;
mod catalog;
mod concurrency;
mod coordinator;
mod rebuild;

pub use base::ValidationError;
pub use catalog::{
    CatalogConfig, DATA_FILE_PLACEHOLDER, ForeignKeyConfig, STATEMENT_PLACEHOLDER, TABLE_PLACEHOLDER,
    TableConfig,
};
pub use concurrency::ConcurrencyConfig;
pub use coordinator::CoordinatorConfig;
pub use rebuild::RebuildConfig;
