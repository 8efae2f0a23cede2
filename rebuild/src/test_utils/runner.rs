use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use crate::commands::{CommandOutput, CommandRunner};

#[derive(Debug, Clone)]
enum Action {
    Fail { exit_code: i32, stderr: String },
    Respond { stdout: Vec<String> },
    Hold { semaphore: Arc<Semaphore> },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    action: Action,
}

/// Something that happened to a command, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Started(String),
    Finished(String),
}

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<Rule>,
    started: Vec<String>,
    events: Vec<RunnerEvent>,
    running: usize,
    peak_running: usize,
}

/// Releases commands held by [`ScriptedRunner::hold_on`].
#[derive(Debug, Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
}

impl Gate {
    /// Lets every held command continue, including commands started later.
    pub fn open_all(&self) {
        self.semaphore.close();
    }
}

/// [`CommandRunner`] whose commands finish according to scripted rules instead of running.
///
/// Rules match when their pattern is a substring of the command. Commands succeed with no output
/// unless a rule says otherwise. Every matching `respond_on` rule contributes its lines and any
/// matching `fail_on` rule makes the command fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes matching commands exit with `exit_code` and `stderr`.
    pub fn fail_on(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.add_rule(
            pattern,
            Action::Fail {
                exit_code,
                stderr: stderr.to_string(),
            },
        );
    }

    /// Makes matching commands print `stdout`.
    pub fn respond_on(&self, pattern: &str, stdout: Vec<String>) {
        self.add_rule(pattern, Action::Respond { stdout });
    }

    /// Keeps matching commands running until the returned [`Gate`] opens.
    pub fn hold_on(&self, pattern: &str) -> Gate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.add_rule(
            pattern,
            Action::Hold {
                semaphore: semaphore.clone(),
            },
        );

        Gate { semaphore }
    }

    /// Commands in the order they started.
    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Position of the first `event` among the starts and ends of commands, in the order they
    /// happened. Terminated commands never finish.
    pub fn event_position(&self, event: &RunnerEvent) -> Option<usize> {
        self.lock().events.iter().position(|e| e == event)
    }

    /// Started commands containing `pattern`.
    pub fn started_matching(&self, pattern: &str) -> Vec<String> {
        self.lock()
            .started
            .iter()
            .filter(|command| command.contains(pattern))
            .cloned()
            .collect()
    }

    /// Number of commands currently running.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Highest number of commands that ran at the same time.
    pub fn peak_running(&self) -> usize {
        self.lock().peak_running
    }

    fn add_rule(&self, pattern: &str, action: Action) {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            action,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the running count when a command ends or is dropped.
struct RunningGuard {
    inner: Arc<Mutex<Inner>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.running -= 1;
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str) -> CommandOutput {
        let actions = {
            let mut inner = self.lock();
            inner.started.push(command.to_string());
            inner.events.push(RunnerEvent::Started(command.to_string()));
            inner.running += 1;
            inner.peak_running = inner.peak_running.max(inner.running);

            inner
                .rules
                .iter()
                .filter(|rule| command.contains(&rule.pattern))
                .map(|rule| rule.action.clone())
                .collect::<Vec<_>>()
        };
        let _guard = RunningGuard {
            inner: self.inner.clone(),
        };

        let mut stdout = Vec::new();
        let mut failure = None;
        for action in actions {
            match action {
                Action::Hold { semaphore } => {
                    // A closed semaphore means the gate was opened for everyone.
                    if let Ok(permit) = semaphore.acquire().await {
                        permit.forget();
                    }
                }
                Action::Respond { stdout: lines } => stdout.extend(lines),
                Action::Fail { exit_code, stderr } => {
                    failure.get_or_insert((exit_code, stderr));
                }
            }
        }

        {
            let mut inner = self.lock();
            inner.events.push(RunnerEvent::Finished(command.to_string()));
        }

        match failure {
            Some((exit_code, stderr)) => CommandOutput::exited(exit_code, stdout, vec![stderr]),
            None => CommandOutput::exited(0, stdout, Vec::new()),
        }
    }
}
