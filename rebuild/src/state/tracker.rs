use std::collections::HashMap;

use tracing::{debug, info};

use crate::catalog::gather::{DataFileAnnouncement, parse_announcements};
use crate::catalog::{Catalog, TableDescriptor};
use crate::commands::{CommandId, CommandPools, CommandRunner, FinishedCommand};
use crate::error::{ErrorKind, RebuildError, RebuildResult};
use crate::state::foreign_keys::{DependencyResolver, PendingForeignKey};
use crate::state::table::{Stage, TableRecord};
use crate::step::StepType;
use crate::{bail, rebuild_error};

/// A foreign key or comment command whose failure is only reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftCommand {
    pub step: StepType,
    pub id: CommandId,
    pub table: String,
    pub statement: String,
}

/// Run state the tracker reads and mutates while advancing tables.
#[derive(Debug)]
pub struct TrackerContext<'a, C, R> {
    pub catalog: &'a C,
    pub pools: &'a CommandPools<R>,
    pub resolver: &'a mut DependencyResolver,
    pub soft_commands: &'a mut Vec<SoftCommand>,
}

/// Holds every [`TableRecord`] of a run and drives their stage machines.
#[derive(Debug, Default)]
pub struct TableTracker {
    records: Vec<TableRecord>,
    index: HashMap<String, usize>,
}

impl TableTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Returns `false` if a record with the same name exists.
    ///
    /// Records advance in insertion order, which is also the order their first commands are
    /// queued in.
    pub fn insert(&mut self, record: TableRecord) -> bool {
        if self.index.contains_key(record.name()) {
            return false;
        }

        self.index
            .insert(record.name().to_string(), self.records.len());
        self.records.push(record);

        true
    }

    pub fn get(&self, table: &str) -> Option<&TableRecord> {
        self.index.get(table).map(|i| &self.records[*i])
    }

    pub fn records(&self) -> &[TableRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn done_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_done()).count()
    }

    /// Returns `true` if some table may still schedule commands of `step`.
    ///
    /// Foreign keys and comments never belong to a table stage and always return `false`.
    pub fn needs_step(&self, step: StepType) -> bool {
        let Some(stage) = step.stage() else {
            return false;
        };

        self.records
            .iter()
            .any(|record| !record.is_done() && record.stage() <= stage)
    }

    /// Harvests finished commands and moves every table whose stage completed to its next stage.
    ///
    /// A failed command aborts before any table transitions. Returns the number of transitions.
    pub fn advance_all<C, R>(&mut self, ctx: &mut TrackerContext<'_, C, R>) -> RebuildResult<usize>
    where
        C: Catalog,
        R: CommandRunner,
    {
        let announcements = self.harvest(ctx.pools)?;
        self.apply_announcements(ctx.catalog, announcements)?;

        // Tables filled only by other tables' gather output cannot know they got every file
        // before all gather commands finished.
        let gathers_pending = self
            .records
            .iter()
            .any(|record| record.has_own_gather() && record.stage() <= Stage::Gathering);

        let mut transitions = 0;
        for i in 0..self.records.len() {
            if self.advance_record(i, gathers_pending, ctx)? {
                transitions += 1;
            }
        }

        Ok(transitions)
    }

    /// Queues the foreign keys and schedules the comments of a done table.
    ///
    /// Only the first call per table does anything. Returns the number of queued or scheduled
    /// statements.
    pub fn discover_dependents<C, R>(
        &mut self,
        table: &str,
        ctx: &mut TrackerContext<'_, C, R>,
    ) -> RebuildResult<usize>
    where
        C: Catalog,
        R: CommandRunner,
    {
        let Some(&i) = self.index.get(table) else {
            bail!(
                ErrorKind::InvalidState,
                "Dependents requested for an unknown table",
                table
            );
        };

        let record = &mut self.records[i];
        if !record.is_done() {
            bail!(
                ErrorKind::InvalidState,
                "Dependents requested before the table is done",
                format!("table {} is in stage {}", table, record.stage())
            );
        }

        if !record.mark_dependents_discovered() {
            debug!(%table, "dependents already discovered");
            return Ok(0);
        }

        let descriptor = descriptor(ctx.catalog, table)?;

        let mut discovered = 0;
        for foreign_key in descriptor.foreign_key_statements() {
            let queued = ctx.resolver.enqueue(PendingForeignKey {
                table: table.to_string(),
                references: foreign_key.references,
                statement: foreign_key.statement,
            });
            if queued {
                discovered += 1;
            }
        }

        let pool = ctx.pools.get(StepType::Comment);
        for statement in descriptor.comment_statements() {
            let id = pool.schedule(ctx.catalog.execute_ddl(&statement));
            ctx.soft_commands.push(SoftCommand {
                step: StepType::Comment,
                id,
                table: table.to_string(),
                statement,
            });
            discovered += 1;
        }

        Ok(discovered)
    }

    /// Removes finished commands from every table and collects gather announcements together
    /// with the table whose gather printed them.
    fn harvest<R>(
        &mut self,
        pools: &CommandPools<R>,
    ) -> RebuildResult<Vec<(String, DataFileAnnouncement)>>
    where
        R: CommandRunner,
    {
        let mut announcements = Vec::new();

        for record in &mut self.records {
            let Some(step) = record.stage().step() else {
                continue;
            };

            let pool = pools.get(step);
            for id in record.outstanding().to_vec() {
                let Some(finished) = pool.take_finished(id) else {
                    continue;
                };
                record.remove_outstanding(id);

                if !finished.success() {
                    return Err(command_failed(record.name(), step, &finished));
                }

                if step == StepType::Gather {
                    let parsed = parse_announcements(&finished.command, &finished.output.stdout)?;
                    announcements.extend(
                        parsed
                            .into_iter()
                            .map(|announcement| (record.name().to_string(), announcement)),
                    );
                }
            }
        }

        Ok(announcements)
    }

    /// Attaches announced data files to their tables, creating records for new tables.
    ///
    /// A gather command may announce files for its own table and for tables without a gather
    /// command. Tables with their own gather only receive files from it, so the files a table
    /// loads never depend on which gather finishes first.
    fn apply_announcements<C>(
        &mut self,
        catalog: &C,
        announcements: Vec<(String, DataFileAnnouncement)>,
    ) -> RebuildResult<()>
    where
        C: Catalog,
    {
        for (source, announcement) in announcements {
            if let Some(&i) = self.index.get(&announcement.table) {
                let record = &mut self.records[i];
                if record.has_own_gather() && record.name() != source {
                    bail!(
                        ErrorKind::GatherOutputInvalid,
                        "Data file announced for a table with its own gather command",
                        format!(
                            "gather of table {} announced file {} for table {}",
                            source, announcement.data_file, announcement.table
                        )
                    );
                }

                if record.stage() > Stage::Gathering {
                    bail!(
                        ErrorKind::GatherOutputInvalid,
                        "Data file announced for a table that already left gathering",
                        format!(
                            "table {} is in stage {}, file {}",
                            announcement.table,
                            record.stage(),
                            announcement.data_file
                        )
                    );
                }

                record.add_data_file(announcement.data_file);
                continue;
            }

            let descriptor = descriptor(catalog, &announcement.table)?;
            let mut record = TableRecord::announced(
                announcement.table.clone(),
                descriptor.clustered_index_statement().is_some(),
            );
            record.add_data_file(announcement.data_file);

            info!(table = %announcement.table, "discovered table from gather output");
            self.insert(record);
        }

        Ok(())
    }

    /// Moves table `i` to its next stage with commands if its current stage completed.
    fn advance_record<C, R>(
        &mut self,
        i: usize,
        gathers_pending: bool,
        ctx: &mut TrackerContext<'_, C, R>,
    ) -> RebuildResult<bool>
    where
        C: Catalog,
        R: CommandRunner,
    {
        let record = &mut self.records[i];
        if record.is_done() || !record.outstanding().is_empty() {
            return Ok(false);
        }

        if record.stage() == Stage::Gathering && !record.has_own_gather() && gathers_pending {
            return Ok(false);
        }

        let descriptor = descriptor(ctx.catalog, record.name())?;

        let mut next = record.stage().next(record.has_clustered_index());
        let commands = loop {
            if next == Stage::Done {
                break Vec::new();
            }

            let commands = stage_commands(ctx.catalog, descriptor, record.data_files(), next);
            if !commands.is_empty() {
                break commands;
            }

            next = next.next(record.has_clustered_index());
        };

        record.transition(next)?;
        info!(
            table = %record.name(),
            stage = %next,
            commands = commands.len(),
            "table entered stage"
        );

        if let Some(step) = next.step() {
            let pool = ctx.pools.get(step);
            for command in commands {
                record.push_outstanding(pool.schedule(command));
            }

            return Ok(true);
        }

        let table = record.name().to_string();
        ctx.resolver.mark_done(&table);
        self.discover_dependents(&table, ctx)?;

        Ok(true)
    }
}

/// Returns the commands a table runs when it enters `stage`.
fn stage_commands<C>(
    catalog: &C,
    descriptor: &C::Descriptor,
    data_files: &[String],
    stage: Stage,
) -> Vec<String>
where
    C: Catalog,
{
    let ddl = |statement: Option<String>| {
        statement
            .map(|statement| catalog.execute_ddl(&statement))
            .into_iter()
            .collect::<Vec<_>>()
    };

    match stage {
        Stage::NotStarted | Stage::Done => Vec::new(),
        Stage::Gathering => descriptor.gather_command().into_iter().collect(),
        Stage::Converting => data_files
            .iter()
            .filter_map(|data_file| descriptor.convert_command(data_file))
            .collect(),
        Stage::Dropping => ddl(descriptor.drop_statement()),
        Stage::Creating => ddl(descriptor.create_statement()),
        Stage::Loading => data_files
            .iter()
            .filter_map(|data_file| descriptor.load_command(data_file))
            .collect(),
        Stage::ClusteredIndexing => ddl(descriptor.clustered_index_statement()),
        Stage::Clustering => ddl(descriptor.cluster_statement()),
        Stage::Optimizing => descriptor.optimize_command().into_iter().collect(),
        Stage::Indexing => descriptor
            .index_statements()
            .iter()
            .map(|statement| catalog.execute_ddl(statement))
            .collect(),
    }
}

fn descriptor<'a, C>(catalog: &'a C, table: &str) -> RebuildResult<&'a C::Descriptor>
where
    C: Catalog,
{
    match catalog.descriptor(table) {
        Some(descriptor) => Ok(descriptor),
        None => bail!(
            ErrorKind::MissingTableDescriptor,
            "No descriptor is known for the table",
            table
        ),
    }
}

fn command_failed(table: &str, step: StepType, finished: &FinishedCommand) -> RebuildError {
    let (kind, exit) = match finished.output.exit_code {
        _ if finished.output.spawn_failed => {
            (ErrorKind::CommandSpawnFailed, "failed to start".to_string())
        }
        Some(code) => (ErrorKind::CommandFailed, format!("finished with exit code {code}")),
        None => (ErrorKind::CommandFailed, "finished with no exit code".to_string()),
    };

    rebuild_error!(
        kind,
        "Command of a hard step failed",
        format!(
            "table {table}, step {step}, command `{}` {exit}\n{}",
            finished.command,
            finished.stderr_text()
        )
    )
}
