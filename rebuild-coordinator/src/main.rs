//! Front-end database rebuild binary.
//!
//! Loads the configuration, runs every selected table through its rebuild commands and prints the
//! outcome. Exits with status 0 only when no hard failure happened.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rebuild::catalog::TableSelection;
use rebuild::summary::RunSummary;
use rebuild_telemetry::tracing::init_tracing;

use crate::config::load_rebuild_config;
use crate::core::rebuild_with_config;
use crate::error::{CoordinatorError, CoordinatorResult};

mod config;
mod core;
mod error;

/// Rebuilds the front-end database from its sources.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Table to rebuild. May be repeated. Every selectable table is rebuilt when omitted.
    #[arg(long = "table", value_name = "NAME")]
    tables: Vec<String>,

    /// Directory holding `base` and environment configuration files.
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,
}

impl Args {
    fn selection(&self) -> TableSelection {
        if self.tables.is_empty() {
            return TableSelection::All;
        }

        TableSelection::Only(self.tables.clone())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match main_impl(args) {
        Ok(summary) => {
            print_summary(&summary);

            if summary.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn main_impl(args: Args) -> CoordinatorResult<RunSummary> {
    let rebuild_config = load_rebuild_config(args.config_dir.as_deref())?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(CoordinatorError::config)?;

    let summary = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(rebuild_with_config(rebuild_config, args.selection()))?;

    Ok(summary)
}

/// Prints warnings and the hard failure to stderr, then the summary line to stdout.
fn print_summary(summary: &RunSummary) {
    for soft_failure in &summary.soft_failures {
        eprintln!("{soft_failure}");
    }

    if let Some(hard_failure) = &summary.hard_failure {
        eprintln!("error: {hard_failure}");
    }

    println!("{summary}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_default_to_every_selectable_table() {
        let args = Args::try_parse_from(["rebuild-coordinator"]).unwrap();

        assert_eq!(args.selection(), TableSelection::All);
        assert!(args.config_dir.is_none());
    }

    #[test]
    fn repeated_tables_are_selected() {
        let args = Args::try_parse_from([
            "rebuild-coordinator",
            "--table",
            "marker",
            "--table",
            "accession",
            "--config-dir",
            "/etc/rebuild",
        ])
        .unwrap();

        assert_eq!(
            args.selection(),
            TableSelection::Only(vec!["marker".to_string(), "accession".to_string()])
        );
        assert_eq!(args.config_dir, Some(PathBuf::from("/etc/rebuild")));
    }
}
