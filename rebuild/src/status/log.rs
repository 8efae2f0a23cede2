use tracing::info;

use crate::status::StatusSink;

/// [`StatusSink`] writing every label to the log.
#[derive(Debug, Clone, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn set_status(&self, label: &str) {
        info!(status = %label, "rebuild status changed");
    }
}
