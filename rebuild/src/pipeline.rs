use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rebuild_config::shared::CoordinatorConfig;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::catalog::{Catalog, TableDescriptor, TableSelection};
use crate::commands::{CommandPools, CommandRunner};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, RebuildError, RebuildResult};
use crate::metrics::register_metrics;
use crate::report::Reporter;
use crate::state::{
    DependencyResolver, PendingForeignKey, SoftCommand, TableRecord, TableTracker, TrackerContext,
};
use crate::status::StatusSink;
use crate::step::{StepStatus, StepType};
use crate::summary::{RunStatus, RunSummary, SoftFailure};

/// Lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    Draining,
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            PipelineState::NotStarted => "not started",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
        };

        f.write_str(state)
    }
}

/// Result of a single [`Pipeline::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Some hard step still has work.
    Working,
    /// Every hard step ended and the run can drain.
    Finished,
}

/// Drives a rebuild run.
///
/// A run discovers its tables, then ticks until every hard step ended: each tick harvests finished
/// commands, advances the tables, releases the foreign keys whose tables are both done and
/// collects soft failures. The drain phase then forces the remaining foreign keys through and
/// waits for the foreign key and comment pools. Any error terminates every pool and fails the run.
#[derive(Debug)]
pub struct Pipeline<C, R, S> {
    config: Arc<CoordinatorConfig>,
    catalog: C,
    pools: CommandPools<R>,
    status_sink: S,
    tracker: TableTracker,
    resolver: DependencyResolver,
    soft_commands: Vec<SoftCommand>,
    soft_failures: Vec<SoftFailure>,
    step_statuses: HashMap<StepType, StepStatus>,
    started_steps: HashSet<StepType>,
    reporter: Reporter,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<C, R, S> Pipeline<C, R, S>
where
    C: Catalog,
    R: CommandRunner,
    S: StatusSink,
{
    pub fn new(config: CoordinatorConfig, catalog: C, runner: R, status_sink: S) -> Self {
        register_metrics();

        let pools = CommandPools::new(&config.concurrency, runner);
        let reporter = Reporter::new(config.report_interval());
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            catalog,
            pools,
            status_sink,
            tracker: TableTracker::new(),
            resolver: DependencyResolver::new(),
            soft_commands: Vec::new(),
            soft_failures: Vec::new(),
            step_statuses: StepType::ALL
                .iter()
                .map(|step| (*step, StepStatus::Working))
                .collect(),
            started_steps: HashSet::new(),
            reporter,
            state: PipelineState::NotStarted,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Returns a handle that aborts the run when signalled.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn pools(&self) -> &CommandPools<R> {
        &self.pools
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn table(&self, table: &str) -> Option<&TableRecord> {
        self.tracker.get(table)
    }

    /// Every table of the run, selected ones first, in the order they were added.
    pub fn tables(&self) -> &[TableRecord] {
        self.tracker.records()
    }

    pub fn soft_failures(&self) -> &[SoftFailure] {
        &self.soft_failures
    }

    pub fn step_status(&self, step: StepType) -> StepStatus {
        self.step_statuses
            .get(&step)
            .copied()
            .unwrap_or(StepStatus::Working)
    }

    /// Runs every phase and returns the summary of the run.
    ///
    /// Errors never escape: they fail the run and end up in [`RunSummary::hard_failure`].
    pub async fn execute(&mut self, selection: &TableSelection) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();

        let hard_failure = match self.execute_phases(selection).await {
            Ok(()) => None,
            Err(err) => {
                self.abort(&err);
                Some(err)
            }
        };

        let status = match hard_failure {
            None => RunStatus::Succeeded,
            Some(_) => RunStatus::Failed,
        };

        let summary = RunSummary {
            status,
            started_at,
            elapsed: started.elapsed(),
            tables: self.tracker.len(),
            tables_done: self.tracker.done_count(),
            hard_failure,
            soft_failures: self.soft_failures.clone(),
        };

        info!(
            %status,
            tables = summary.tables,
            tables_done = summary.tables_done,
            soft_failures = summary.soft_failures.len(),
            elapsed = ?summary.elapsed,
            "rebuild ended"
        );

        summary
    }

    async fn execute_phases(&mut self, selection: &TableSelection) -> RebuildResult<()> {
        self.start(selection)?;
        self.run().await?;
        self.drain().await
    }

    /// Discovers the tables of the run and schedules their gather commands.
    ///
    /// Every selected table is checked before anything is scheduled, so a discovery error runs no
    /// command.
    pub fn start(&mut self, selection: &TableSelection) -> RebuildResult<()> {
        if self.state != PipelineState::NotStarted {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline was already started",
                format!("pipeline is {}", self.state)
            );
        }

        let tables = self.catalog.discover(selection)?;
        if tables.is_empty() {
            bail!(ErrorKind::DiscoveryError, "No table was selected for rebuild");
        }

        let mut records = Vec::with_capacity(tables.len());
        for table in tables {
            let Some(descriptor) = self.catalog.descriptor(&table) else {
                bail!(
                    ErrorKind::MissingTableDescriptor,
                    "No descriptor is known for the table",
                    table
                );
            };
            if descriptor.gather_command().is_none() {
                bail!(
                    ErrorKind::DiscoveryError,
                    "Selected table has no gather command",
                    table
                );
            }

            let has_clustered_index = descriptor.clustered_index_statement().is_some();
            records.push(TableRecord::new(table, has_clustered_index));
        }

        // Priority tables go first, in the configured order. The sort is stable, so the others
        // keep the catalog order.
        let priority_tables = &self.config.priority_tables;
        records.sort_by_key(|record| {
            priority_tables
                .iter()
                .position(|table| table == record.name())
                .unwrap_or(usize::MAX)
        });
        for record in records {
            self.tracker.insert(record);
        }

        info!(tables = self.tracker.len(), "starting rebuild");

        self.state = PipelineState::Running;
        self.started_steps.insert(StepType::Gather);
        self.status_sink.set_status(StepType::Gather.started_label());

        if let Err(err) = self.advance() {
            self.abort(&err);
            return Err(err);
        }

        Ok(())
    }

    /// Ticks until every hard step ended, sleeping the configured interval between ticks.
    pub async fn run(&mut self) -> RebuildResult<()> {
        let tick_interval = self.config.tick_interval();

        loop {
            if self.tick()? == TickOutcome::Finished {
                info!("every hard step ended");
                return Ok(());
            }

            tokio::time::sleep(tick_interval).await;
        }
    }

    /// Performs one step of the driver loop without waiting on anything.
    ///
    /// On error every pool is terminated and the pipeline is failed, so later ticks error with
    /// [`ErrorKind::InvalidState`] without touching any table.
    pub fn tick(&mut self) -> RebuildResult<TickOutcome> {
        if self.state != PipelineState::Running {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline is not running",
                format!("pipeline is {}", self.state)
            );
        }

        match self.try_tick() {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    fn try_tick(&mut self) -> RebuildResult<TickOutcome> {
        if self.shutdown_requested() {
            bail!(ErrorKind::RunAborted, "Run aborted by a shutdown request");
        }

        self.advance()?;

        let released = self.resolver.release_eligible();
        self.schedule_foreign_keys(released);

        self.harvest_soft_commands();
        self.update_step_statuses();
        self.reporter.maybe_report(&self.pools, &self.resolver);

        let finished = StepType::HARD
            .iter()
            .all(|step| self.step_status(*step) == StepStatus::Ended);
        if finished {
            return Ok(TickOutcome::Finished);
        }

        Ok(TickOutcome::Working)
    }

    /// Forces the remaining foreign keys through and waits for every pool to empty.
    pub async fn drain(&mut self) -> RebuildResult<()> {
        if self.state != PipelineState::Running {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline cannot drain",
                format!("pipeline is {}", self.state)
            );
        }

        self.state = PipelineState::Draining;

        if let Err(err) = self.try_drain().await {
            self.abort(&err);
            return Err(err);
        }

        self.state = PipelineState::Succeeded;
        self.status_sink.set_status(RunStatus::Succeeded.as_str());

        Ok(())
    }

    async fn try_drain(&mut self) -> RebuildResult<()> {
        info!("draining foreign keys and comments");

        for step in StepType::HARD {
            self.wait_for_pool(step).await?;
        }

        let forced = self.resolver.force_release_all();
        if !forced.is_empty() {
            warn!(
                foreign_keys = forced.len(),
                "forcing foreign keys whose tables did not both finish"
            );
        }
        self.schedule_foreign_keys(forced);
        self.update_step_statuses();

        for step in [StepType::ForeignKey, StepType::Comment] {
            self.wait_for_pool(step).await?;
            self.harvest_soft_commands();

            self.step_statuses.insert(step, StepStatus::Ended);
            if self.started_steps.contains(&step) {
                self.status_sink.set_status(step.finished_label());
            }
        }

        Ok(())
    }

    /// Queues and schedules the dependents of a done table. Only the first call per table does
    /// anything; returns the number of queued or scheduled statements.
    pub fn discover_dependents(&mut self, table: &str) -> RebuildResult<usize> {
        let mut ctx = TrackerContext {
            catalog: &self.catalog,
            pools: &self.pools,
            resolver: &mut self.resolver,
            soft_commands: &mut self.soft_commands,
        };

        self.tracker.discover_dependents(table, &mut ctx)
    }

    /// Terminates every pool and fails the run. Does nothing if the run already failed.
    fn abort(&mut self, err: &RebuildError) {
        if self.state == PipelineState::Failed {
            return;
        }

        error!(kind = ?err.kind(), "rebuild failed: {err}");

        let terminated = self.pools.terminate_all();
        if terminated > 0 {
            warn!(commands = terminated, "terminated outstanding commands");
        }

        self.state = PipelineState::Failed;
        self.status_sink.set_status(RunStatus::Failed.as_str());
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_rx.has_changed().unwrap_or(false)
    }

    fn advance(&mut self) -> RebuildResult<usize> {
        let mut ctx = TrackerContext {
            catalog: &self.catalog,
            pools: &self.pools,
            resolver: &mut self.resolver,
            soft_commands: &mut self.soft_commands,
        };

        self.tracker.advance_all(&mut ctx)
    }

    fn schedule_foreign_keys(&mut self, foreign_keys: Vec<PendingForeignKey>) {
        let pool = self.pools.get(StepType::ForeignKey);

        for foreign_key in foreign_keys {
            let id = pool.schedule(self.catalog.execute_ddl(&foreign_key.statement));
            info!(
                table = %foreign_key.table,
                references = %foreign_key.references,
                handle = %id,
                "scheduled foreign key"
            );

            self.soft_commands.push(SoftCommand {
                step: StepType::ForeignKey,
                id,
                table: foreign_key.table,
                statement: foreign_key.statement,
            });
        }
    }

    /// Collects finished foreign key and comment commands, recording the failed ones.
    fn harvest_soft_commands(&mut self) {
        let mut outstanding = Vec::with_capacity(self.soft_commands.len());

        for soft_command in std::mem::take(&mut self.soft_commands) {
            let Some(finished) = self.pools.get(soft_command.step).take_finished(soft_command.id)
            else {
                outstanding.push(soft_command);
                continue;
            };

            if finished.success() {
                debug!(
                    table = %soft_command.table,
                    step = %soft_command.step,
                    "soft command finished"
                );
                continue;
            }

            warn!(
                table = %soft_command.table,
                step = %soft_command.step,
                exit_code = ?finished.output.exit_code,
                stderr = %finished.stderr_text(),
                "soft command failed, continuing"
            );
            self.soft_failures.push(SoftFailure {
                step: soft_command.step,
                table: soft_command.table,
                statement: soft_command.statement,
                exit_code: finished.output.exit_code,
                stderr: finished.output.stderr,
            });
        }

        self.soft_commands = outstanding;
    }

    /// Publishes started and finished labels and ends the hard steps no table needs anymore.
    fn update_step_statuses(&mut self) {
        for step in StepType::ALL {
            let pool = self.pools.get(step);

            if pool.total_scheduled() > 0 && self.started_steps.insert(step) {
                self.status_sink.set_status(step.started_label());
            }

            if !step.is_hard() || self.step_status(step) == StepStatus::Ended {
                continue;
            }

            if self.tracker.needs_step(step) || !pool.is_idle() {
                continue;
            }

            debug!(%step, "step ended");
            self.step_statuses.insert(step, StepStatus::Ended);
            if self.started_steps.contains(&step) {
                self.status_sink.set_status(step.finished_label());
            }
        }
    }

    /// Waits for the pool of `step` to empty while still reporting, unless shutdown is requested.
    async fn wait_for_pool(&mut self, step: StepType) -> RebuildResult<()> {
        let interval = self.config.tick_interval();
        let pool = self.pools.get(step);
        let pools = &self.pools;
        let resolver = &self.resolver;
        let reporter = &mut self.reporter;

        let aborted = tokio::select! {
            _ = pool.wait(interval, || {
                reporter.maybe_report(pools, resolver);
            }) => false,
            _ = self.shutdown_rx.changed() => true,
        };

        if aborted {
            bail!(
                ErrorKind::RunAborted,
                "Run aborted by a shutdown request",
                format!("while draining {step} commands")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rebuild_config::shared::ConcurrencyConfig;

    use super::*;
    use crate::catalog::ConfiguredCatalog;
    use crate::state::Stage;
    use crate::status::MemoryStatusSink;
    use crate::test_utils::catalog::{TestTable, announce, test_catalog};
    use crate::test_utils::runner::{RunnerEvent, ScriptedRunner};

    type TestPipeline = Pipeline<ConfiguredCatalog, ScriptedRunner, MemoryStatusSink>;

    fn coordinator_config(priority_tables: &[&str]) -> CoordinatorConfig {
        CoordinatorConfig {
            concurrency: ConcurrencyConfig::default(),
            tick_interval_ms: 100,
            report_interval_ms: 60_000,
            priority_tables: priority_tables.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn pipeline(
        config: CoordinatorConfig,
        tables: Vec<TestTable>,
        runner: ScriptedRunner,
    ) -> (TestPipeline, MemoryStatusSink) {
        let sink = MemoryStatusSink::new();
        let pipeline = Pipeline::new(config, test_catalog(tables), runner, sink.clone());

        (pipeline, sink)
    }

    /// Gather output announcing one data file for each of `tables`.
    fn announce_files(runner: &ScriptedRunner, tables: &[&str]) {
        for table in tables {
            runner.respond_on(
                &format!("gather {table}"),
                vec![announce(table, &format!("/data/{table}.tsv"))],
            );
        }
    }

    /// `accession` has priority and no clustered index, `marker` is clustered with a foreign key
    /// to `accession` and `reference` has no foreign key.
    fn genome_tables() -> Vec<TestTable> {
        vec![
            TestTable::new("marker")
                .clustered()
                .foreign_key("accession")
                .comment("markers"),
            TestTable::new("reference"),
            TestTable::new("accession"),
        ]
    }

    async fn tick_until_error(pipeline: &mut TestPipeline) -> RebuildError {
        for _ in 0..1_000 {
            match pipeline.tick() {
                Ok(TickOutcome::Working) => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok(TickOutcome::Finished) => panic!("run finished without error"),
                Err(err) => return err,
            }
        }
        panic!("run did not fail");
    }

    fn histories(pipeline: &TestPipeline) -> Vec<Vec<Stage>> {
        pipeline
            .tables()
            .iter()
            .map(|record| record.history().to_vec())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_rebuild_succeeds() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        let (mut pipeline, sink) = pipeline(
            coordinator_config(&["accession"]),
            genome_tables(),
            runner.clone(),
        );

        let summary = pipeline.execute(&TableSelection::All).await;

        assert_eq!(summary.status, RunStatus::Succeeded);
        assert!(summary.hard_failure.is_none());
        assert!(summary.soft_failures.is_empty());
        assert_eq!((summary.tables, summary.tables_done), (3, 3));

        // Every gather runs at once, with the priority table queued first.
        assert_eq!(
            runner.started_matching("gather"),
            vec!["gather accession", "gather marker", "gather reference"]
        );
        assert_eq!(pipeline.pools().get(StepType::Gather).peak_active_count(), 3);

        // The foreign key waits for both tables to finish indexing.
        let foreign_key = runner.started_matching("foreign key");
        assert_eq!(foreign_key.len(), 1);
        let foreign_key_start = runner
            .event_position(&RunnerEvent::Started(foreign_key[0].clone()))
            .unwrap();
        for index in [
            "ddl 'create index marker_idx on marker'",
            "ddl 'create index accession_idx on accession'",
        ] {
            let index_end = runner
                .event_position(&RunnerEvent::Finished(index.to_string()))
                .unwrap();
            assert!(index_end < foreign_key_start);
        }

        let labels = sink.labels();
        assert_eq!(labels.first().map(String::as_str), Some("gathering data"));
        assert_eq!(labels.last().map(String::as_str), Some("succeeded"));
        for label in [
            "finished gathering data",
            "finished loading data",
            "finished indexing tables",
            "creating foreign keys",
            "adding comments",
        ] {
            assert!(labels.iter().any(|l| l == label), "missing label {label}");
        }
        assert_eq!(pipeline.state(), PipelineState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_ceiling_holds_for_every_step() {
        let names = ["t1", "t2", "t3", "t4", "t5", "t6"];
        let runner = ScriptedRunner::new();
        announce_files(&runner, &names);
        let loads = runner.hold_on("load");
        let tables = names.iter().map(|name| TestTable::new(name)).collect();
        let (mut pipeline, _) = pipeline(coordinator_config(&[]), tables, runner.clone());

        let opener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            loads.open_all();
        });
        let summary = pipeline.execute(&TableSelection::All).await;
        opener.await.unwrap();

        assert!(summary.succeeded());
        let config = ConcurrencyConfig::default();
        for pool in pipeline.pools().iter() {
            assert!(pool.peak_active_count() <= pool.step().max_concurrency(&config));
        }
        assert_eq!(
            pipeline.pools().get(StepType::Load).peak_active_count(),
            config.load as usize
        );
        assert_eq!(runner.started_matching("load").len(), names.len());
    }

    #[tokio::test(start_paused = true)]
    async fn stages_only_move_forward() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        let (mut pipeline, _) = pipeline(coordinator_config(&["accession"]), genome_tables(), runner);

        let summary = pipeline.execute(&TableSelection::All).await;

        assert!(summary.succeeded());
        for record in pipeline.tables() {
            assert!(record.history().windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(record.history().last(), Some(&Stage::Done));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clustering_stages_run_only_with_a_clustered_index() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        let (mut pipeline, _) =
            pipeline(coordinator_config(&["accession"]), genome_tables(), runner.clone());

        pipeline.execute(&TableSelection::All).await;

        let accession = pipeline.table("accession").unwrap().history();
        for stage in [
            Stage::ClusteredIndexing,
            Stage::Clustering,
            Stage::Optimizing,
        ] {
            assert!(!accession.contains(&stage));
        }
        let loading = accession.iter().position(|s| *s == Stage::Loading).unwrap();
        assert_eq!(accession[loading + 1], Stage::Indexing);

        let marker = pipeline.table("marker").unwrap().history();
        assert!(marker.contains(&Stage::Clustering));
        assert_eq!(runner.started_matching("cluster accession").len(), 0);
        assert_eq!(runner.started_matching("optimize marker").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_key_waits_for_both_tables() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker"]);
        let accession_load = runner.hold_on("load accession");
        let (mut pipeline, _) = pipeline(
            coordinator_config(&[]),
            vec![
                TestTable::new("marker").foreign_key("accession"),
                TestTable::new("accession"),
            ],
            runner,
        );
        pipeline.start(&TableSelection::All).unwrap();

        while !pipeline.table("marker").unwrap().is_done() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            pipeline.tick().unwrap();
        }

        assert_eq!(pipeline.resolver().pending_count(), 1);
        assert_eq!(pipeline.pools().get(StepType::ForeignKey).total_scheduled(), 0);

        accession_load.open_all();
        while !pipeline.table("accession").unwrap().is_done() {
            assert_eq!(pipeline.resolver().released_count(), 0);
            tokio::time::sleep(Duration::from_millis(100)).await;
            pipeline.tick().unwrap();
        }

        // Scheduled by the same tick that finished the referenced table.
        assert_eq!(pipeline.resolver().pending_count(), 0);
        assert_eq!(pipeline.pools().get(StepType::ForeignKey).total_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_terminates_every_pool() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        runner.fail_on("load marker", 1, "duplicate key value");
        let _slow_gather = runner.hold_on("gather reference");
        let (mut pipeline, sink) =
            pipeline(coordinator_config(&[]), genome_tables(), runner.clone());
        pipeline.start(&TableSelection::All).unwrap();

        let err = tick_until_error(&mut pipeline).await;

        assert_eq!(err.kind(), ErrorKind::CommandFailed);
        assert!(err.detail().unwrap().contains("table marker, step load"));
        assert!(err.detail().unwrap().contains("duplicate key value"));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.pools().all_terminated());
        assert_eq!(sink.last_label().as_deref(), Some("failed"));

        let after_failure = histories(&pipeline);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let err = pipeline.tick().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(histories(&pipeline), after_failure);
        assert_eq!(runner.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_reports_the_hard_failure() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        runner.fail_on("load marker", 2, "disk full");
        let (mut pipeline, _) = pipeline(coordinator_config(&[]), genome_tables(), runner.clone());

        let summary = pipeline.execute(&TableSelection::All).await;

        assert_eq!(summary.status, RunStatus::Failed);
        let hard_failure = summary.hard_failure.as_ref().unwrap();
        assert_eq!(hard_failure.kind(), ErrorKind::CommandFailed);
        assert!(hard_failure.detail().unwrap().contains("exit code 2"));
        assert!(summary.to_string().starts_with("rebuild failed in "));
        assert!(!pipeline.table("marker").unwrap().is_done());
        assert!(runner.started_matching("foreign key").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_comment_does_not_fail_the_run() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        runner.fail_on("comment on table marker", 1, "relation does not exist");
        let (mut pipeline, sink) = pipeline(coordinator_config(&[]), genome_tables(), runner);

        let summary = pipeline.execute(&TableSelection::All).await;

        assert_eq!(summary.status, RunStatus::Succeeded);
        assert_eq!(summary.tables_done, 3);
        assert_eq!(summary.soft_failures.len(), 1);
        let warning = &summary.soft_failures[0];
        assert_eq!((warning.step, warning.table.as_str()), (StepType::Comment, "marker"));
        assert_eq!(warning.exit_code, Some(1));
        assert!(warning.to_string().contains("relation does not exist"));
        assert!(pipeline.tables().iter().all(TableRecord::is_done));
        assert_eq!(sink.last_label().as_deref(), Some("succeeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn dependents_are_discovered_once_per_table() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        let (mut pipeline, _) = pipeline(coordinator_config(&[]), genome_tables(), runner);

        let summary = pipeline.execute(&TableSelection::All).await;
        assert!(summary.succeeded());

        assert_eq!(pipeline.discover_dependents("marker").unwrap(), 0);
        assert_eq!(pipeline.resolver().pending_count(), 0);
        assert_eq!(pipeline.resolver().released_count(), 1);
        assert_eq!(pipeline.pools().get(StepType::ForeignKey).total_scheduled(), 1);
        assert_eq!(pipeline.pools().get(StepType::Comment).total_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_keys_to_tables_outside_the_run_are_forced_at_drain() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["marker"]);
        let (mut pipeline, _) = pipeline(coordinator_config(&[]), genome_tables(), runner.clone());

        let summary = pipeline
            .execute(&TableSelection::Only(vec!["marker".to_string()]))
            .await;

        assert!(summary.succeeded());
        assert_eq!(summary.tables, 1);
        assert_eq!(runner.started_matching("foreign key references accession").len(), 1);
        assert_eq!(pipeline.step_status(StepType::ForeignKey), StepStatus::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_errors_fail_before_any_command() {
        let runner = ScriptedRunner::new();
        let (mut pipeline, sink) = pipeline(
            coordinator_config(&[]),
            vec![TestTable::new("marker"), TestTable::new("alias").derived()],
            runner.clone(),
        );

        let summary = pipeline
            .execute(&TableSelection::Only(vec!["alias".to_string()]))
            .await;

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(
            summary.hard_failure.unwrap().kind(),
            ErrorKind::DiscoveryError
        );
        assert!(runner.started().is_empty());
        assert_eq!(sink.labels(), vec!["failed".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_the_run() {
        let runner = ScriptedRunner::new();
        announce_files(&runner, &["accession", "marker", "reference"]);
        let _loads = runner.hold_on("load");
        let (mut pipeline, _) = pipeline(coordinator_config(&[]), genome_tables(), runner.clone());
        let shutdown_tx = pipeline.shutdown_tx();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            shutdown_tx.shutdown().unwrap();
        });
        let summary = pipeline.execute(&TableSelection::All).await;
        trigger.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.hard_failure.unwrap().kind(), ErrorKind::RunAborted);
        assert!(pipeline.pools().all_terminated());
        assert_eq!(runner.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticking_before_start_is_an_error() {
        let (mut pipeline, _) =
            pipeline(coordinator_config(&[]), genome_tables(), ScriptedRunner::new());

        let err = pipeline.tick().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(pipeline.state(), PipelineState::NotStarted);
    }
}
