//! Metrics emitted by the rebuild.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};

static REGISTER_METRICS: Once = Once::new();

/// Label for the step type of a command pool.
pub const STEP_LABEL: &str = "step";

/// Label for the outcome of a finished command, either `success` or `failure`.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the stage a table entered.
pub const STAGE_LABEL: &str = "stage";

/// Gauge for commands currently running, per step type.
pub const REBUILD_POOL_ACTIVE_COMMANDS: &str = "rebuild_pool_active_commands";

/// Gauge for commands waiting for a free slot, per step type.
pub const REBUILD_POOL_WAITING_COMMANDS: &str = "rebuild_pool_waiting_commands";

/// Gauge for foreign keys waiting on their tables.
pub const REBUILD_PENDING_FOREIGN_KEYS: &str = "rebuild_pending_foreign_keys";

/// Counter for finished commands, per step type and outcome.
pub const REBUILD_COMMANDS_FINISHED_TOTAL: &str = "rebuild_commands_finished_total";

/// Counter for table stage transitions, per stage entered.
pub const REBUILD_STAGE_TRANSITIONS_TOTAL: &str = "rebuild_stage_transitions_total";

/// Registers the descriptions of every rebuild metric. Safe to call more than once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_gauge!(
            REBUILD_POOL_ACTIVE_COMMANDS,
            Unit::Count,
            "Commands currently running in a pool"
        );

        describe_gauge!(
            REBUILD_POOL_WAITING_COMMANDS,
            Unit::Count,
            "Commands waiting for a free slot in a pool"
        );

        describe_gauge!(
            REBUILD_PENDING_FOREIGN_KEYS,
            Unit::Count,
            "Foreign keys waiting for both of their tables to finish indexing"
        );

        describe_counter!(
            REBUILD_COMMANDS_FINISHED_TOTAL,
            Unit::Count,
            "Commands that finished, by step type and outcome"
        );

        describe_counter!(
            REBUILD_STAGE_TRANSITIONS_TOTAL,
            Unit::Count,
            "Table stage transitions, by stage entered"
        );
    });
}
