use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::environment::{Environment, UnknownEnvironment};
use crate::shared::{RebuildConfig, ValidationError};

/// Directory searched when the coordinator is not given one.
pub const DEFAULT_CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried for every file layer, in order.
const LAYER_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Prefix of override variables such as `APP_COORDINATOR__TICK_INTERVAL_MS`.
const OVERRIDE_PREFIX: &str = "APP";

/// Separates nested keys in override variables, as in `APP_COORDINATOR__CONCURRENCY__LOAD`.
const OVERRIDE_NESTING: &str = "__";

/// Override keys holding comma-separated lists, e.g. `APP_COORDINATOR__PRIORITY_TABLES=marker,accession`.
const OVERRIDE_LIST_KEYS: [&str; 1] = ["coordinator.priority_tables"];

/// Errors raised while assembling a [`RebuildConfig`].
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("configuration directory `{}` does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("no {layer} file in `{}`, expected {layer}.yaml, {layer}.yml or {layer}.json", directory.display())]
    MissingLayer {
        layer: &'static str,
        directory: PathBuf,
    },

    #[error("failed to read `{}`: {source}", path.display())]
    Layer {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("failed to apply `APP_` overrides: {0}")]
    Overrides(#[source] config::ConfigError),

    #[error("configuration does not describe a rebuild: {0}")]
    Deserialization(#[source] config::ConfigError),

    #[error(transparent)]
    Environment(#[from] UnknownEnvironment),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Loads and validates the configuration of a rebuild.
///
/// Sources, from lowest to highest precedence:
/// 1. `base.(yaml|yml|json)` holding the catalog and shared settings.
/// 2. `dev` or `prod` file of the selected [`Environment`].
/// 3. `APP_` variables, e.g. `APP_COORDINATOR__CONCURRENCY__LOAD=1`,
///    `APP_CATALOG__DDL_COMMAND="psql --command {statement}"` or `APP_METRICS_PORT=9000`.
///    Catalog tables are a list and can only be replaced by the file layers.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    directory: PathBuf,
    environment: Environment,
    /// Replaces the process environment as the source of `APP_` overrides.
    overrides: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    pub fn new(directory: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            directory: directory.into(),
            environment,
            overrides: None,
        }
    }

    /// Loader of the coordinator binary.
    ///
    /// Reads `directory`, or [`DEFAULT_CONFIGURATION_DIR`] relative to the working directory,
    /// in the environment named by `APP_ENVIRONMENT`.
    pub fn from_env(directory: Option<&Path>) -> Result<Self, LoadConfigError> {
        let directory = directory
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIGURATION_DIR));

        Ok(Self::new(directory, Environment::from_env()?))
    }

    /// Takes `APP_` overrides from `variables` instead of the process environment.
    pub fn with_overrides<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides = Some(
            variables
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn load(&self) -> Result<RebuildConfig, LoadConfigError> {
        if !self.directory.is_dir() {
            return Err(LoadConfigError::MissingDirectory(self.directory.clone()));
        }

        let base = self.read_layer("base")?;
        let environment = self.read_layer(self.environment.file_stem())?;

        let merged = config::Config::builder()
            .add_source(base)
            .add_source(environment)
            .add_source(self.override_source())
            .build()
            .map_err(LoadConfigError::Overrides)?;

        let config = merged
            .try_deserialize::<RebuildConfig>()
            .map_err(LoadConfigError::Deserialization)?;
        config.validate()?;

        Ok(config)
    }

    /// Parses one file layer on its own so a broken file is reported by path.
    fn read_layer(&self, layer: &'static str) -> Result<config::Config, LoadConfigError> {
        let path = LAYER_EXTENSIONS
            .iter()
            .map(|extension| self.directory.join(format!("{layer}.{extension}")))
            .find(|path| path.is_file())
            .ok_or_else(|| LoadConfigError::MissingLayer {
                layer,
                directory: self.directory.clone(),
            })?;

        config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .map_err(|source| LoadConfigError::Layer { path, source })
    }

    fn override_source(&self) -> config::Environment {
        let source = OVERRIDE_LIST_KEYS.iter().fold(
            config::Environment::with_prefix(OVERRIDE_PREFIX)
                .prefix_separator("_")
                .separator(OVERRIDE_NESTING)
                .try_parsing(true)
                .list_separator(","),
            |source, key| source.with_list_parse_key(key),
        );

        source.source(self.overrides.clone())
    }
}
