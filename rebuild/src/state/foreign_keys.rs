use std::collections::HashSet;

use tracing::debug;

/// A foreign key statement waiting for both of its tables to finish indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingForeignKey {
    /// Table declaring the foreign key.
    pub table: String,
    /// Table referenced by the foreign key.
    pub references: String,
    pub statement: String,
}

/// Gates foreign key creation on the completion of the tables involved.
///
/// Holds the set of tables done indexing and the pending statements, in the order they were
/// enqueued. A statement is handed out at most once over the lifetime of the resolver.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    done: HashSet<String>,
    pending: Vec<PendingForeignKey>,
    /// Table and statement of every key ever enqueued, used to reject duplicates.
    seen: HashSet<(String, String)>,
    released: usize,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a foreign key to the pending list without releasing it.
    ///
    /// Returns `false` if the table already enqueued the same statement.
    pub fn enqueue(&mut self, foreign_key: PendingForeignKey) -> bool {
        let key = (foreign_key.table.clone(), foreign_key.statement.clone());
        if !self.seen.insert(key) {
            return false;
        }

        debug!(
            table = %foreign_key.table,
            references = %foreign_key.references,
            "foreign key waiting on its tables"
        );
        self.pending.push(foreign_key);

        true
    }

    /// Adds `table` to the set of tables done indexing.
    ///
    /// Returns `false` if the table was already done.
    pub fn mark_done(&mut self, table: &str) -> bool {
        self.done.insert(table.to_string())
    }

    pub fn is_done(&self, table: &str) -> bool {
        self.done.contains(table)
    }

    /// Removes and returns every pending foreign key whose tables are both done, keeping the
    /// relative order of the remaining ones.
    pub fn release_eligible(&mut self) -> Vec<PendingForeignKey> {
        let (eligible, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|foreign_key| {
                    self.done.contains(&foreign_key.table)
                        && self.done.contains(&foreign_key.references)
                });

        self.pending = pending;
        self.released += eligible.len();

        eligible
    }

    /// Removes and returns every pending foreign key regardless of its tables.
    pub fn force_release_all(&mut self) -> Vec<PendingForeignKey> {
        let released = std::mem::take(&mut self.pending);
        self.released += released.len();

        released
    }

    pub fn pending(&self) -> &[PendingForeignKey] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of foreign keys handed out so far.
    pub fn released_count(&self) -> usize {
        self.released
    }
}
