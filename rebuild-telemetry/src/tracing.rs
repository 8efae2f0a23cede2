use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Directive used when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVE: &str = "info";

static INIT_TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Must be held until the process exits, otherwise the last lines may be lost.
#[derive(Debug)]
#[must_use = "dropping the flusher stops writing logs"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber of `app_name`.
///
/// Logs go to stderr through a non-blocking writer so that stdout only carries the run summary.
/// The filter is read from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    tracing::info!(app = app_name, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing through the test harness, once per test binary.
///
/// Nothing is logged unless `RUST_LOG` is set.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let Ok(filter) = EnvFilter::try_from_default_env() else {
            return;
        };

        // Another test helper may have installed a subscriber already.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_can_be_initialized_repeatedly() {
        init_test_tracing();
        init_test_tracing();
    }
}
