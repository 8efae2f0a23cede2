//! Configuration types and loading for the front-end rebuild.
//!
//! [`ConfigLoader`] layers a `base` file, the file of the selected [`Environment`] and `APP_`
//! variables into a validated [`shared::RebuildConfig`].

pub mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{ConfigLoader, DEFAULT_CONFIGURATION_DIR, LoadConfigError};
