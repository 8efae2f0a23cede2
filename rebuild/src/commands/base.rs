use std::fmt;
use std::future::Future;

/// Opaque identifier of a command scheduled on a [`crate::commands::CommandPool`].
///
/// Identifiers are unique within one pool only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a scheduled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Waiting for a free slot in its pool.
    Pending,
    /// Started and not yet finished.
    Running,
    /// Exited, failed to start or was terminated.
    Finished,
}

/// Exit status and captured output of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the process, [`None`] when it never ran to completion.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Set when the process could not be started at all.
    pub spawn_failed: bool,
}

impl CommandOutput {
    /// Output of a command that exited with `exit_code`.
    pub fn exited(exit_code: i32, stdout: Vec<String>, stderr: Vec<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout,
            stderr,
            spawn_failed: false,
        }
    }

    /// Output of a command that did not produce an exit code.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: Vec::new(),
            stderr: vec![message.into()],
            spawn_failed: false,
        }
    }

    /// Output of a command whose process could not be started.
    pub fn not_spawned(message: impl Into<String>) -> Self {
        Self {
            spawn_failed: true,
            ..Self::failed(message)
        }
    }

    /// Output of a command killed by [`crate::commands::CommandPool::terminate_all`].
    pub fn terminated() -> Self {
        Self::failed("terminated")
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A finished command removed from its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedCommand {
    pub id: CommandId,
    pub command: String,
    pub output: CommandOutput,
}

impl FinishedCommand {
    pub fn success(&self) -> bool {
        self.output.success()
    }

    /// Captured stderr joined into a single block.
    pub fn stderr_text(&self) -> String {
        self.output.stderr.join("\n")
    }
}

/// Runs a single command string to completion.
///
/// The returned future is dropped when the command is terminated, implementations must stop the
/// underlying work when that happens.
pub trait CommandRunner: Clone + Send + Sync + 'static {
    fn run(&self, command: &str) -> impl Future<Output = CommandOutput> + Send;
}
