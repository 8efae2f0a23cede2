use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{ConcurrencyConfig, ValidationError};

/// Settings of the coordinator driving the rebuild.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Per step type concurrency ceilings.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Milliseconds the driver sleeps between two polling ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Milliseconds between two progress reports.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Tables whose gather command is moved to the front of the gather queue, in order.
    #[serde(default)]
    pub priority_tables: Vec<String>,
}

impl CoordinatorConfig {
    /// Default polling tick interval in milliseconds.
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

    /// Default reporting interval in milliseconds.
    pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 60_000;

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// Validates intervals and concurrency ceilings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.concurrency.validate()?;

        if self.tick_interval_ms == 0 {
            return Err(ValidationError::ZeroTickInterval);
        }

        if self.report_interval_ms == 0 {
            return Err(ValidationError::ZeroReportInterval);
        }

        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
            priority_tables: Vec::new(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    CoordinatorConfig::DEFAULT_TICK_INTERVAL_MS
}

fn default_report_interval_ms() -> u64 {
    CoordinatorConfig::DEFAULT_REPORT_INTERVAL_MS
}
