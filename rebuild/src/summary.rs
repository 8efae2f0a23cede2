//! Outcome of a rebuild run.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::RebuildError;
use crate::step::StepType;

/// Overall status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign key or comment command that failed without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    pub step: StepType,
    pub table: String,
    pub statement: String,
    pub exit_code: Option<i32>,
    pub stderr: Vec<String>,
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning: {} of table {} failed",
            self.step, self.table
        )?;
        match self.exit_code {
            Some(code) => write!(f, " with exit code {code}")?,
            None => write!(f, " without exit code")?,
        }
        write!(f, ": {}", self.statement)?;

        for line in &self.stderr {
            write!(f, "\n  {line}")?;
        }

        Ok(())
    }
}

/// Final report of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Number of tables tracked by the run, including tables discovered from gather output.
    pub tables: usize,
    pub tables_done: usize,
    /// The error that aborted the run.
    pub hard_failure: Option<RebuildError>,
    pub soft_failures: Vec<SoftFailure>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rebuild {} in {:.1}s",
            self.status,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_shows_status_and_elapsed_time() {
        let summary = RunSummary {
            status: RunStatus::Failed,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(83_240),
            tables: 3,
            tables_done: 1,
            hard_failure: None,
            soft_failures: Vec::new(),
        };

        assert_eq!(summary.to_string(), "rebuild failed in 83.2s");
        assert!(!summary.succeeded());
    }

    #[test]
    fn soft_failure_lists_stderr() {
        let failure = SoftFailure {
            step: StepType::Comment,
            table: "marker".to_string(),
            statement: "comment on table marker is 'markers'".to_string(),
            exit_code: Some(1),
            stderr: vec!["relation does not exist".to_string()],
        };

        assert_eq!(
            failure.to_string(),
            "warning: comment of table marker failed with exit code 1: comment on table marker \
             is 'markers'\n  relation does not exist"
        );
    }
}
