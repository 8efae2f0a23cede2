use std::fmt;

use rebuild_config::shared::ConcurrencyConfig;

use crate::state::table::Stage;

/// Kind of external command, each kind running in its own bounded pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepType {
    Gather,
    Convert,
    Drop,
    Create,
    Load,
    ClusteredIndex,
    Cluster,
    Optimize,
    Index,
    ForeignKey,
    Comment,
}

impl StepType {
    /// Every step type, in the order a table goes through them.
    pub const ALL: [StepType; 11] = [
        StepType::Gather,
        StepType::Convert,
        StepType::Drop,
        StepType::Create,
        StepType::Load,
        StepType::ClusteredIndex,
        StepType::Cluster,
        StepType::Optimize,
        StepType::Index,
        StepType::ForeignKey,
        StepType::Comment,
    ];

    /// Step types whose failures abort the run.
    pub const HARD: [StepType; 9] = [
        StepType::Gather,
        StepType::Convert,
        StepType::Drop,
        StepType::Create,
        StepType::Load,
        StepType::ClusteredIndex,
        StepType::Cluster,
        StepType::Optimize,
        StepType::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Gather => "gather",
            StepType::Convert => "convert",
            StepType::Drop => "drop",
            StepType::Create => "create",
            StepType::Load => "load",
            StepType::ClusteredIndex => "clustered_index",
            StepType::Cluster => "cluster",
            StepType::Optimize => "optimize",
            StepType::Index => "index",
            StepType::ForeignKey => "foreign_key",
            StepType::Comment => "comment",
        }
    }

    /// Returns `true` if a failing command of this type aborts the run.
    pub fn is_hard(&self) -> bool {
        !matches!(self, StepType::ForeignKey | StepType::Comment)
    }

    /// Returns the table stage during which commands of this type run.
    ///
    /// Foreign keys and comments are not part of the per-table machine.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StepType::Gather => Some(Stage::Gathering),
            StepType::Convert => Some(Stage::Converting),
            StepType::Drop => Some(Stage::Dropping),
            StepType::Create => Some(Stage::Creating),
            StepType::Load => Some(Stage::Loading),
            StepType::ClusteredIndex => Some(Stage::ClusteredIndexing),
            StepType::Cluster => Some(Stage::Clustering),
            StepType::Optimize => Some(Stage::Optimizing),
            StepType::Index => Some(Stage::Indexing),
            StepType::ForeignKey | StepType::Comment => None,
        }
    }

    /// Status label published when the first command of this type is scheduled.
    pub fn started_label(&self) -> &'static str {
        match self {
            StepType::Gather => "gathering data",
            StepType::Convert => "converting data",
            StepType::Drop => "dropping tables",
            StepType::Create => "creating tables",
            StepType::Load => "loading data",
            StepType::ClusteredIndex => "creating clustered indexes",
            StepType::Cluster => "clustering tables",
            StepType::Optimize => "optimizing tables",
            StepType::Index => "indexing tables",
            StepType::ForeignKey => "creating foreign keys",
            StepType::Comment => "adding comments",
        }
    }

    /// Status label published once no table needs this step type anymore.
    pub fn finished_label(&self) -> &'static str {
        match self {
            StepType::Gather => "finished gathering data",
            StepType::Convert => "finished converting data",
            StepType::Drop => "finished dropping tables",
            StepType::Create => "finished creating tables",
            StepType::Load => "finished loading data",
            StepType::ClusteredIndex => "finished creating clustered indexes",
            StepType::Cluster => "finished clustering tables",
            StepType::Optimize => "finished optimizing tables",
            StepType::Index => "finished indexing tables",
            StepType::ForeignKey => "finished creating foreign keys",
            StepType::Comment => "finished adding comments",
        }
    }

    /// Returns the configured concurrency ceiling of this step type.
    pub fn max_concurrency(&self, config: &ConcurrencyConfig) -> usize {
        let value = match self {
            StepType::Gather => config.gather,
            StepType::Convert => config.convert,
            StepType::Drop => config.drop,
            StepType::Create => config.create,
            StepType::Load => config.load,
            StepType::ClusteredIndex => config.clustered_index,
            StepType::Cluster => config.cluster,
            StepType::Optimize => config.optimize,
            StepType::Index => config.index,
            StepType::ForeignKey => config.foreign_key,
            StepType::Comment => config.comment,
        };

        usize::from(value)
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a step type over the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Some table may still need this step type or its pool still has work.
    Working,
    /// No table will schedule commands of this type again and its pool is empty.
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_steps_are_the_staged_ones() {
        for step in StepType::ALL {
            assert_eq!(step.is_hard(), step.stage().is_some(), "{step}");
        }
        assert!(StepType::HARD.iter().all(StepType::is_hard));
    }

    #[test]
    fn ceilings_are_read_from_their_own_key() {
        let config = ConcurrencyConfig {
            clustered_index: 7,
            ..ConcurrencyConfig::default()
        };

        assert_eq!(StepType::ClusteredIndex.max_concurrency(&config), 7);
        assert_eq!(
            StepType::Cluster.max_concurrency(&config),
            usize::from(ConcurrencyConfig::DEFAULT_CLUSTER)
        );
    }
}
