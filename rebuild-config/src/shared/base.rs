use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A step type was configured with a concurrency ceiling of zero.
    #[error("`concurrency.{0}` cannot be zero")]
    ZeroConcurrency(&'static str),
    /// The polling tick interval cannot be zero.
    #[error("`tick_interval_ms` cannot be zero")]
    ZeroTickInterval,
    /// The reporting interval cannot be zero.
    #[error("`report_interval_ms` cannot be zero")]
    ZeroReportInterval,
    /// The same table is declared more than once in the catalog.
    #[error("table `{0}` is declared more than once")]
    DuplicateTable(String),
    /// A high-priority table is not declared in the catalog.
    #[error("priority table `{0}` is not declared in the catalog")]
    UnknownPriorityTable(String),
    /// A foreign key references a table that is not declared in the catalog.
    #[error("foreign key of table `{table}` references undeclared table `{references}`")]
    UnknownForeignKeyTable { table: String, references: String },
    /// The DDL command template does not contain the statement placeholder.
    #[error("`catalog.ddl_command` must contain the `{{statement}}` placeholder")]
    MissingStatementPlaceholder,
}
