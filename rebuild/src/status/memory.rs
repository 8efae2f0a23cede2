use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::status::StatusSink;

/// A published status label and when it was published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub label: String,
    pub at: DateTime<Utc>,
}

/// [`StatusSink`] keeping every label in memory.
///
/// Clones share the same entries, so a clone kept outside the coordinator observes its labels.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusSink {
    entries: Arc<Mutex<Vec<StatusEntry>>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatusEntry> {
        self.lock().clone()
    }

    /// Published labels, in order.
    pub fn labels(&self) -> Vec<String> {
        self.lock().iter().map(|entry| entry.label.clone()).collect()
    }

    pub fn last_label(&self) -> Option<String> {
        self.lock().last().map(|entry| entry.label.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StatusEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for MemoryStatusSink {
    fn set_status(&self, label: &str) {
        self.lock().push(StatusEntry {
            label: label.to_string(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_labels() {
        let sink = MemoryStatusSink::new();
        let observer = sink.clone();

        sink.set_status("gathering data");
        sink.set_status("finished gathering data");

        assert_eq!(
            observer.labels(),
            vec!["gathering data", "finished gathering data"]
        );
        assert_eq!(observer.last_label().as_deref(), Some("finished gathering data"));
        let entries = observer.entries();
        assert!(entries[0].at <= entries[1].at);
    }
}
