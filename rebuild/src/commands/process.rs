use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::commands::{CommandOutput, CommandRunner};

/// Shell used when none is configured.
const DEFAULT_SHELL: &str = "sh";

/// Runs commands as child processes through `sh -c`.
///
/// Children are killed when their future is dropped, so terminating a pool does not leave orphaned
/// processes behind.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &str) -> CommandOutput {
        debug!(%command, "spawning command");

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) => {
                return CommandOutput::not_spawned(format!("failed to spawn command: {err}"));
            }
        };

        match child.wait_with_output().await {
            Ok(output) => CommandOutput {
                exit_code: output.status.code(),
                stdout: into_lines(&output.stdout),
                stderr: into_lines(&output.stderr),
                spawn_failed: false,
            },
            Err(err) => CommandOutput::failed(format!("failed to wait for command: {err}")),
        }
    }
}

fn into_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let runner = ProcessRunner::new();

        let output = runner
            .run("echo first; echo second; echo oops >&2; exit 3")
            .await;

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, vec!["first", "second"]);
        assert_eq!(output.stderr, vec!["oops"]);
        assert!(!output.success());
        assert!(!output.spawn_failed);
    }

    #[tokio::test]
    async fn missing_shell_is_reported_without_exit_code() {
        let runner = ProcessRunner::with_shell("/nonexistent/shell");

        let output = runner.run("true").await;

        assert_eq!(output.exit_code, None);
        assert!(output.spawn_failed);
        assert!(output.stderr[0].starts_with("failed to spawn command"));
    }
}
