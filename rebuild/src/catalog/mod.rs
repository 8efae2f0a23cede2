//! Per-table knowledge of which commands rebuild a table.

mod base;
mod configured;
pub mod gather;

pub use base::{Catalog, ForeignKeyStatement, TableDescriptor, TableSelection};
pub use configured::{ConfiguredCatalog, ConfiguredTable, shell_quote};
