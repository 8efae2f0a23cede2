use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::counter;
use rebuild_config::shared::ConcurrencyConfig;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::commands::{CommandId, CommandOutput, CommandRunner, CommandStatus, FinishedCommand};
use crate::metrics::{OUTCOME_LABEL, REBUILD_COMMANDS_FINISHED_TOTAL, STEP_LABEL};
use crate::step::StepType;

#[derive(Debug)]
struct CommandEntry {
    command: String,
    status: CommandStatus,
    output: Option<CommandOutput>,
}

/// Bookkeeping shared between the pool and the tasks watching running commands.
#[derive(Debug, Default)]
struct CommandPoolInner {
    next_id: u64,
    entries: HashMap<CommandId, CommandEntry>,
    /// Commands waiting for a free slot, in scheduling order.
    waiting: VecDeque<CommandId>,
    running: HashMap<CommandId, AbortHandle>,
    peak_active: usize,
    terminated: bool,
}

/// Bounded pool running the commands of one step type.
///
/// At most `max_concurrency` commands run at once, the others wait in FIFO order. Finishing a
/// command and promoting the next waiting one happen under the same lock.
#[derive(Debug, Clone)]
pub struct CommandPool<R> {
    step: StepType,
    max_concurrency: usize,
    runner: R,
    inner: Arc<Mutex<CommandPoolInner>>,
}

impl<R> CommandPool<R>
where
    R: CommandRunner,
{
    /// Creates an empty pool. A ceiling of zero is raised to one.
    pub fn new(step: StepType, max_concurrency: usize, runner: R) -> Self {
        Self {
            step,
            max_concurrency: max_concurrency.max(1),
            runner,
            inner: Arc::new(Mutex::new(CommandPoolInner::default())),
        }
    }

    pub fn step(&self) -> StepType {
        self.step
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Enqueues `command` and starts it right away if a slot is free.
    ///
    /// Never waits for the command itself. Must be called from within a tokio runtime.
    pub fn schedule(&self, command: impl Into<String>) -> CommandId {
        let command = command.into();
        let mut inner = self.lock();

        let id = CommandId::new(inner.next_id);
        inner.next_id += 1;

        if inner.terminated {
            warn!(step = %self.step, %command, "pool was terminated, command will not run");
            inner.entries.insert(
                id,
                CommandEntry {
                    command,
                    status: CommandStatus::Finished,
                    output: Some(CommandOutput::terminated()),
                },
            );

            return id;
        }

        debug!(step = %self.step, handle = %id, %command, "scheduling command");
        inner.entries.insert(
            id,
            CommandEntry {
                command,
                status: CommandStatus::Pending,
                output: None,
            },
        );
        inner.waiting.push_back(id);
        self.promote(&mut inner);

        id
    }

    /// Returns the status of `id`, or [`None`] if the pool does not know it.
    pub fn status(&self, id: CommandId) -> Option<CommandStatus> {
        self.lock().entries.get(&id).map(|entry| entry.status)
    }

    /// Returns the exit code of `id` once it finished.
    pub fn exit_code(&self, id: CommandId) -> Option<i32> {
        self.lock()
            .entries
            .get(&id)
            .and_then(|entry| entry.output.as_ref())
            .and_then(|output| output.exit_code)
    }

    /// Takes the captured stdout of `id` once it finished, freeing the buffer.
    pub fn stdout(&self, id: CommandId) -> Vec<String> {
        self.lock()
            .entries
            .get_mut(&id)
            .and_then(|entry| entry.output.as_mut())
            .map(|output| std::mem::take(&mut output.stdout))
            .unwrap_or_default()
    }

    /// Takes the captured stderr of `id` once it finished, freeing the buffer.
    pub fn stderr(&self, id: CommandId) -> Vec<String> {
        self.lock()
            .entries
            .get_mut(&id)
            .and_then(|entry| entry.output.as_mut())
            .map(|output| std::mem::take(&mut output.stderr))
            .unwrap_or_default()
    }

    /// Removes `id` from the pool and returns it if it finished.
    ///
    /// Pending and running commands are left untouched.
    pub fn take_finished(&self, id: CommandId) -> Option<FinishedCommand> {
        let mut inner = self.lock();
        if inner.entries.get(&id)?.status != CommandStatus::Finished {
            return None;
        }

        let entry = inner.entries.remove(&id)?;

        Some(FinishedCommand {
            id,
            command: entry.command,
            output: entry.output.unwrap_or_default(),
        })
    }

    pub fn active_count(&self) -> usize {
        self.lock().running.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Highest number of commands that ran at the same time.
    pub fn peak_active_count(&self) -> usize {
        self.lock().peak_active
    }

    /// Number of commands ever scheduled on this pool.
    pub fn total_scheduled(&self) -> u64 {
        self.lock().next_id
    }

    /// Returns `true` when no command is running or waiting.
    pub fn is_idle(&self) -> bool {
        let inner = self.lock();
        inner.running.is_empty() && inner.waiting.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Waits until every scheduled command finished, calling `on_tick` once per polling interval.
    pub async fn wait<F>(&self, interval: Duration, mut on_tick: F)
    where
        F: FnMut(),
    {
        while !self.is_idle() {
            on_tick();
            tokio::time::sleep(interval).await;
        }
    }

    /// Kills every running command and finishes every waiting one without running it.
    ///
    /// Commands scheduled afterwards finish immediately. Returns how many commands were affected.
    pub fn terminate_all(&self) -> usize {
        let mut inner = self.lock();
        inner.terminated = true;

        let running = inner.running.drain().collect::<Vec<_>>();
        let waiting = inner.waiting.drain(..).collect::<Vec<_>>();
        let count = running.len() + waiting.len();

        for (id, abort_handle) in running {
            abort_handle.abort();
            finish_entry(&mut inner, id, CommandOutput::terminated());
        }
        for id in waiting {
            finish_entry(&mut inner, id, CommandOutput::terminated());
        }

        if count > 0 {
            warn!(step = %self.step, count, "terminated commands");
        }

        count
    }

    /// Records the output of a running command and promotes waiting ones into the free slot.
    fn complete(&self, id: CommandId, output: CommandOutput) {
        let mut inner = self.lock();

        // Terminated commands were already finished by `terminate_all`.
        if inner.running.remove(&id).is_none() {
            return;
        }

        let outcome = if output.success() { "success" } else { "failure" };
        counter!(
            REBUILD_COMMANDS_FINISHED_TOTAL,
            STEP_LABEL => self.step.as_str(),
            OUTCOME_LABEL => outcome
        )
        .increment(1);

        debug!(step = %self.step, handle = %id, exit_code = ?output.exit_code, "command finished");
        finish_entry(&mut inner, id, output);

        self.promote(&mut inner);
    }

    fn promote(&self, inner: &mut CommandPoolInner) {
        while !inner.terminated && inner.running.len() < self.max_concurrency {
            let Some(id) = inner.waiting.pop_front() else {
                break;
            };

            self.start(inner, id);
        }

        inner.peak_active = inner.peak_active.max(inner.running.len());
    }

    fn start(&self, inner: &mut CommandPoolInner, id: CommandId) {
        let Some(entry) = inner.entries.get_mut(&id) else {
            return;
        };
        entry.status = CommandStatus::Running;

        let runner = self.runner.clone();
        let command = entry.command.clone();
        let task = tokio::spawn(async move { runner.run(&command).await });
        inner.running.insert(id, task.abort_handle());

        let pool = self.clone();
        tokio::spawn(async move {
            let output = match task.await {
                Ok(output) => output,
                Err(err) if err.is_cancelled() => CommandOutput::terminated(),
                Err(err) => CommandOutput::failed(format!("command task panicked: {err}")),
            };

            pool.complete(id, output);
        });
    }

    fn lock(&self) -> MutexGuard<'_, CommandPoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn finish_entry(inner: &mut CommandPoolInner, id: CommandId, output: CommandOutput) {
    if let Some(entry) = inner.entries.get_mut(&id) {
        entry.status = CommandStatus::Finished;
        entry.output = Some(output);
    }
}

/// One [`CommandPool`] per [`StepType`], each with its configured ceiling.
#[derive(Debug, Clone)]
pub struct CommandPools<R> {
    pools: HashMap<StepType, CommandPool<R>>,
}

impl<R> CommandPools<R>
where
    R: CommandRunner,
{
    pub fn new(config: &ConcurrencyConfig, runner: R) -> Self {
        let pools = StepType::ALL
            .into_iter()
            .map(|step| {
                let pool = CommandPool::new(step, step.max_concurrency(config), runner.clone());
                (step, pool)
            })
            .collect();

        Self { pools }
    }

    pub fn get(&self, step: StepType) -> &CommandPool<R> {
        // Every step type gets a pool in `new`.
        &self.pools[&step]
    }

    /// Iterates over the pools in step order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandPool<R>> {
        StepType::ALL.into_iter().map(|step| self.get(step))
    }

    /// Terminates every pool, returning the number of affected commands.
    pub fn terminate_all(&self) -> usize {
        self.iter().map(CommandPool::terminate_all).sum()
    }

    pub fn all_terminated(&self) -> bool {
        self.iter().all(CommandPool::is_terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::runner::ScriptedRunner;

    const TICK: Duration = Duration::from_millis(10);

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_runs_more_than_the_ceiling() {
        let runner = ScriptedRunner::new();
        let gate = runner.hold_on("load");
        let pool = CommandPool::new(StepType::Load, 2, runner.clone());

        let ids = (0..5)
            .map(|i| pool.schedule(format!("load table_{i}")))
            .collect::<Vec<_>>();
        settle().await;

        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.waiting_count(), 3);
        assert_eq!(pool.status(ids[0]), Some(CommandStatus::Running));
        assert_eq!(pool.status(ids[4]), Some(CommandStatus::Pending));

        gate.open_all();
        pool.wait(TICK, || {}).await;

        assert_eq!(pool.peak_active_count(), 2);
        assert_eq!(runner.peak_running(), 2);
        assert!(
            ids.iter()
                .all(|id| pool.status(*id) == Some(CommandStatus::Finished))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_commands_start_in_fifo_order() {
        let runner = ScriptedRunner::new();
        let pool = CommandPool::new(StepType::Index, 1, runner.clone());

        for name in ["first", "second", "third"] {
            pool.schedule(format!("index {name}"));
        }
        pool.wait(TICK, || {}).await;

        assert_eq!(
            runner.started(),
            vec!["index first", "index second", "index third"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn outputs_are_released_after_reading() {
        let runner = ScriptedRunner::new();
        runner.respond_on("gather marker", vec!["line one".to_string()]);
        runner.fail_on("broken", 2, "boom");
        let pool = CommandPool::new(StepType::Gather, 4, runner);

        let ok = pool.schedule("gather marker");
        let broken = pool.schedule("gather broken");
        pool.wait(TICK, || {}).await;

        assert_eq!(pool.exit_code(ok), Some(0));
        assert_eq!(pool.stdout(ok), vec!["line one"]);
        assert!(pool.stdout(ok).is_empty());

        assert_eq!(pool.exit_code(broken), Some(2));
        let finished = pool.take_finished(broken).unwrap();
        assert_eq!(finished.stderr_text(), "boom");
        assert_eq!(pool.status(broken), None);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_calls_back_on_every_tick() {
        let runner = ScriptedRunner::new();
        let gate = runner.hold_on("comment");
        let pool = CommandPool::new(StepType::Comment, 1, runner);
        pool.schedule("comment on marker");

        let mut ticks = 0;
        let opener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            gate.open_all();
        });
        pool.wait(TICK, || ticks += 1).await;
        opener.await.unwrap();

        assert!(ticks >= 3);
        assert!(pool.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_all_finishes_running_and_waiting_commands() {
        let runner = ScriptedRunner::new();
        let _gate = runner.hold_on("load");
        let pool = CommandPool::new(StepType::Load, 1, runner.clone());

        let running = pool.schedule("load marker");
        let waiting = pool.schedule("load reference");
        settle().await;

        assert_eq!(pool.terminate_all(), 2);
        settle().await;

        for id in [running, waiting] {
            assert_eq!(pool.status(id), Some(CommandStatus::Finished));
            assert_eq!(pool.exit_code(id), None);
        }
        assert!(pool.is_idle());
        assert_eq!(runner.started(), vec!["load marker"]);
        assert_eq!(runner.running(), 0);

        let late = pool.schedule("load accession");
        assert_eq!(pool.status(late), Some(CommandStatus::Finished));
        assert!(pool.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn pools_use_per_step_ceilings() {
        let config = ConcurrencyConfig {
            load: 1,
            comment: 9,
            ..ConcurrencyConfig::default()
        };
        let pools = CommandPools::new(&config, ScriptedRunner::new());

        assert_eq!(pools.get(StepType::Load).max_concurrency(), 1);
        assert_eq!(pools.get(StepType::Comment).max_concurrency(), 9);
        assert_eq!(pools.iter().count(), StepType::ALL.len());

        pools.terminate_all();
        assert!(pools.all_terminated());
    }
}
