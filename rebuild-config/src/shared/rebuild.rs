use serde::{Deserialize, Serialize};

use crate::shared::{CatalogConfig, CoordinatorConfig, ValidationError};

/// Complete configuration of a rebuild run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RebuildConfig {
    /// Scheduling settings of the coordinator.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Tables and the commands that rebuild them.
    pub catalog: CatalogConfig,
    /// Port of the Prometheus scrape endpoint. Metrics are not exported when absent.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl RebuildConfig {
    /// Validates the whole configuration, including cross references between sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordinator.validate()?;
        self.catalog.validate()?;

        for name in &self.coordinator.priority_tables {
            if self.catalog.table(name).is_none() {
                return Err(ValidationError::UnknownPriorityTable(name.clone()));
            }
        }

        Ok(())
    }
}
