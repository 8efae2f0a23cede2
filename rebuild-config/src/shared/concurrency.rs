use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Maximum number of concurrently running external commands, per step type.
///
/// Cheap metadata operations (dropping and creating tables, comments) default to a higher ceiling
/// than bulk operations such as loading data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConcurrencyConfig {
    #[serde(default = "default_drop")]
    pub drop: u16,
    #[serde(default = "default_create")]
    pub create: u16,
    #[serde(default = "default_gather")]
    pub gather: u16,
    #[serde(default = "default_convert")]
    pub convert: u16,
    #[serde(default = "default_load")]
    pub load: u16,
    #[serde(default = "default_clustered_index")]
    pub clustered_index: u16,
    #[serde(default = "default_cluster")]
    pub cluster: u16,
    #[serde(default = "default_optimize")]
    pub optimize: u16,
    #[serde(default = "default_index")]
    pub index: u16,
    #[serde(default = "default_foreign_key")]
    pub foreign_key: u16,
    #[serde(default = "default_comment")]
    pub comment: u16,
}

impl ConcurrencyConfig {
    pub const DEFAULT_DROP: u16 = 8;
    pub const DEFAULT_CREATE: u16 = 8;
    pub const DEFAULT_GATHER: u16 = 4;
    pub const DEFAULT_CONVERT: u16 = 4;
    pub const DEFAULT_LOAD: u16 = 2;
    pub const DEFAULT_CLUSTERED_INDEX: u16 = 2;
    pub const DEFAULT_CLUSTER: u16 = 2;
    pub const DEFAULT_OPTIMIZE: u16 = 2;
    pub const DEFAULT_INDEX: u16 = 4;
    pub const DEFAULT_FOREIGN_KEY: u16 = 4;
    pub const DEFAULT_COMMENT: u16 = 8;

    /// Returns every ceiling together with its configuration key.
    pub fn entries(&self) -> [(&'static str, u16); 11] {
        [
            ("drop", self.drop),
            ("create", self.create),
            ("gather", self.gather),
            ("convert", self.convert),
            ("load", self.load),
            ("clustered_index", self.clustered_index),
            ("cluster", self.cluster),
            ("optimize", self.optimize),
            ("index", self.index),
            ("foreign_key", self.foreign_key),
            ("comment", self.comment),
        ]
    }

    /// Ensures no step type is configured with a zero ceiling, which would never run anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.entries().into_iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ValidationError::ZeroConcurrency(key)),
            None => Ok(()),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            drop: default_drop(),
            create: default_create(),
            gather: default_gather(),
            convert: default_convert(),
            load: default_load(),
            clustered_index: default_clustered_index(),
            cluster: default_cluster(),
            optimize: default_optimize(),
            index: default_index(),
            foreign_key: default_foreign_key(),
            comment: default_comment(),
        }
    }
}

fn default_drop() -> u16 {
    ConcurrencyConfig::DEFAULT_DROP
}

fn default_create() -> u16 {
    ConcurrencyConfig::DEFAULT_CREATE
}

fn default_gather() -> u16 {
    ConcurrencyConfig::DEFAULT_GATHER
}

fn default_convert() -> u16 {
    ConcurrencyConfig::DEFAULT_CONVERT
}

fn default_load() -> u16 {
    ConcurrencyConfig::DEFAULT_LOAD
}

fn default_clustered_index() -> u16 {
    ConcurrencyConfig::DEFAULT_CLUSTERED_INDEX
}

fn default_cluster() -> u16 {
    ConcurrencyConfig::DEFAULT_CLUSTER
}

fn default_optimize() -> u16 {
    ConcurrencyConfig::DEFAULT_OPTIMIZE
}

fn default_index() -> u16 {
    ConcurrencyConfig::DEFAULT_INDEX
}

fn default_foreign_key() -> u16 {
    ConcurrencyConfig::DEFAULT_FOREIGN_KEY
}

fn default_comment() -> u16 {
    ConcurrencyConfig::DEFAULT_COMMENT
}
