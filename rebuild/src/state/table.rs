use std::fmt;

use metrics::counter;

use crate::bail;
use crate::commands::CommandId;
use crate::error::{ErrorKind, RebuildResult};
use crate::metrics::{REBUILD_STAGE_TRANSITIONS_TOTAL, STAGE_LABEL};
use crate::step::StepType;

/// Position of a table in its rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    NotStarted,
    Gathering,
    Converting,
    Dropping,
    Creating,
    Loading,
    ClusteredIndexing,
    Clustering,
    Optimizing,
    Indexing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::Gathering => "gathering",
            Stage::Converting => "converting",
            Stage::Dropping => "dropping",
            Stage::Creating => "creating",
            Stage::Loading => "loading",
            Stage::ClusteredIndexing => "clustered_indexing",
            Stage::Clustering => "clustering",
            Stage::Optimizing => "optimizing",
            Stage::Indexing => "indexing",
            Stage::Done => "done",
        }
    }

    /// Step type whose pool runs the commands of this stage.
    pub fn step(&self) -> Option<StepType> {
        match self {
            Stage::NotStarted | Stage::Done => None,
            Stage::Gathering => Some(StepType::Gather),
            Stage::Converting => Some(StepType::Convert),
            Stage::Dropping => Some(StepType::Drop),
            Stage::Creating => Some(StepType::Create),
            Stage::Loading => Some(StepType::Load),
            Stage::ClusteredIndexing => Some(StepType::ClusteredIndex),
            Stage::Clustering => Some(StepType::Cluster),
            Stage::Optimizing => Some(StepType::Optimize),
            Stage::Indexing => Some(StepType::Index),
        }
    }

    /// Stage following this one. Tables without a clustering index go from loading straight to
    /// indexing.
    pub fn next(&self, has_clustered_index: bool) -> Stage {
        match self {
            Stage::NotStarted => Stage::Gathering,
            Stage::Gathering => Stage::Converting,
            Stage::Converting => Stage::Dropping,
            Stage::Dropping => Stage::Creating,
            Stage::Creating => Stage::Loading,
            Stage::Loading if has_clustered_index => Stage::ClusteredIndexing,
            Stage::Loading => Stage::Indexing,
            Stage::ClusteredIndexing => Stage::Clustering,
            Stage::Clustering => Stage::Optimizing,
            Stage::Optimizing => Stage::Indexing,
            Stage::Indexing | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one table.
#[derive(Debug, Clone)]
pub struct TableRecord {
    name: String,
    stage: Stage,
    /// Commands of the current stage that were not harvested yet.
    outstanding: Vec<CommandId>,
    data_files: Vec<String>,
    has_clustered_index: bool,
    /// Whether the table runs its own gather command, as opposed to only receiving files
    /// announced by other tables.
    has_own_gather: bool,
    dependents_discovered: bool,
    /// Every stage the table entered, in order.
    history: Vec<Stage>,
}

impl TableRecord {
    /// Creates a record for a selected table, before its gather command is scheduled.
    pub fn new(name: impl Into<String>, has_clustered_index: bool) -> Self {
        Self {
            name: name.into(),
            stage: Stage::NotStarted,
            outstanding: Vec::new(),
            data_files: Vec::new(),
            has_clustered_index,
            has_own_gather: true,
            dependents_discovered: false,
            history: vec![Stage::NotStarted],
        }
    }

    /// Creates a record for a table first announced by another table's gather command.
    pub fn announced(name: impl Into<String>, has_clustered_index: bool) -> Self {
        Self {
            stage: Stage::Gathering,
            has_own_gather: false,
            history: vec![Stage::Gathering],
            ..Self::new(name, has_clustered_index)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn outstanding(&self) -> &[CommandId] {
        &self.outstanding
    }

    pub fn data_files(&self) -> &[String] {
        &self.data_files
    }

    pub fn has_clustered_index(&self) -> bool {
        self.has_clustered_index
    }

    pub fn has_own_gather(&self) -> bool {
        self.has_own_gather
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub(crate) fn add_data_file(&mut self, data_file: String) {
        self.data_files.push(data_file);
    }

    pub(crate) fn push_outstanding(&mut self, id: CommandId) {
        self.outstanding.push(id);
    }

    pub(crate) fn remove_outstanding(&mut self, id: CommandId) {
        self.outstanding.retain(|outstanding| *outstanding != id);
    }

    /// Marks dependents as discovered, returning `false` if they already were.
    pub(crate) fn mark_dependents_discovered(&mut self) -> bool {
        !std::mem::replace(&mut self.dependents_discovered, true)
    }

    /// Moves the table forward to `stage`.
    ///
    /// Fails when `stage` does not come after the current one or when commands of the current
    /// stage are still outstanding.
    pub(crate) fn transition(&mut self, stage: Stage) -> RebuildResult<()> {
        if stage <= self.stage {
            bail!(
                ErrorKind::InvalidState,
                "Table stages can only move forward",
                format!("table {} cannot go from {} to {}", self.name, self.stage, stage)
            );
        }

        if !self.outstanding.is_empty() {
            bail!(
                ErrorKind::InvalidState,
                "Table left a stage with outstanding commands",
                format!(
                    "table {} has {} outstanding commands in stage {}",
                    self.name,
                    self.outstanding.len(),
                    self.stage
                )
            );
        }

        counter!(REBUILD_STAGE_TRANSITIONS_TOTAL, STAGE_LABEL => stage.as_str()).increment(1);

        self.stage = stage;
        self.history.push(stage);

        Ok(())
    }
}
