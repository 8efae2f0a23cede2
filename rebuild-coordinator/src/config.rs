use std::path::Path;

use rebuild_config::ConfigLoader;
use rebuild_config::shared::RebuildConfig;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Loads and validates the rebuild configuration.
///
/// Reads `configuration_directory` when given and the `configuration` directory of the working
/// directory otherwise, in the environment named by `APP_ENVIRONMENT`.
pub fn load_rebuild_config(
    configuration_directory: Option<&Path>,
) -> CoordinatorResult<RebuildConfig> {
    ConfigLoader::from_env(configuration_directory)
        .and_then(|loader| loader.load())
        .map_err(CoordinatorError::config)
}
