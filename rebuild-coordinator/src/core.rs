use rebuild::catalog::{Catalog, ConfiguredCatalog, TableSelection};
use rebuild::commands::{CommandRunner, ProcessRunner};
use rebuild::pipeline::Pipeline;
use rebuild::status::{LogStatusSink, StatusSink};
use rebuild::summary::RunSummary;
use rebuild_config::shared::RebuildConfig;
use rebuild_telemetry::metrics::init_metrics;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Runs a rebuild of `selection` with the provided configuration.
///
/// Tables are described by the configured catalog and every command runs through `sh -c`.
pub async fn rebuild_with_config(
    rebuild_config: RebuildConfig,
    selection: TableSelection,
) -> CoordinatorResult<RunSummary> {
    info!("starting rebuild coordinator");

    log_config(&rebuild_config);

    if let Some(port) = rebuild_config.metrics_port {
        init_metrics(port).map_err(CoordinatorError::config)?;
        info!(port, "serving metrics");
    }

    let catalog = ConfiguredCatalog::new(rebuild_config.catalog);
    let pipeline = Pipeline::new(
        rebuild_config.coordinator,
        catalog,
        ProcessRunner::new(),
        LogStatusSink,
    );

    Ok(execute_pipeline(pipeline, selection).await)
}

fn log_config(rebuild_config: &RebuildConfig) {
    let coordinator = &rebuild_config.coordinator;

    info!(
        tables = rebuild_config.catalog.tables.len(),
        tick_interval_ms = coordinator.tick_interval_ms,
        report_interval_ms = coordinator.report_interval_ms,
        priority_tables = ?coordinator.priority_tables,
        "rebuild config"
    );

    for (step, max_concurrency) in coordinator.concurrency.entries() {
        debug!(step, max_concurrency, "step concurrency");
    }
}

/// Executes a pipeline, aborting it on SIGINT or SIGTERM.
#[tracing::instrument(skip_all)]
async fn execute_pipeline<C, R, S>(
    mut pipeline: Pipeline<C, R, S>,
    selection: TableSelection,
) -> RunSummary
where
    C: Catalog,
    R: CommandRunner,
    S: StatusSink,
{
    // Spawn a task to listen for shutdown signals and abort the run.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        wait_for_signal().await;

        if let Err(e) = shutdown_tx.shutdown() {
            warn!(error = ?e, "failed to send shutdown signal");
            return;
        }

        info!("rebuild abort requested");
    });

    let summary = pipeline.execute(&selection).await;

    // The run is over, the signal listener is not needed anymore.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    summary
}

/// Resolves on the first SIGINT or SIGTERM. Never resolves if no handler can be registered.
async fn wait_for_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to register sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    let sigint = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = sigint => {
            info!("sigint (ctrl+c) received, aborting rebuild");
        }
        _ = sigterm => {
            info!("sigterm received, aborting rebuild");
        }
    }
}
