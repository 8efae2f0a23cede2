use rebuild_config::shared::{CatalogConfig, ForeignKeyConfig, TableConfig};

use crate::catalog::ConfiguredCatalog;
use crate::catalog::gather::DataFileAnnouncement;

/// DDL command template of catalogs built by [`test_catalog`].
pub const TEST_DDL_COMMAND: &str = "ddl {statement}";

/// Builder of a [`TableConfig`] whose commands are easy to match in a scripted runner.
///
/// For a table named `marker` the commands are `gather marker`, `convert marker <file>`,
/// `load marker <file>` and `optimize marker`. Statements are wrapped by [`TEST_DDL_COMMAND`],
/// for example `ddl 'create index marker_idx on marker'`.
#[derive(Debug, Clone)]
pub struct TestTable {
    config: TableConfig,
}

impl TestTable {
    /// A selectable table with gather, convert, drop, create, load and one index.
    pub fn new(name: &str) -> Self {
        Self {
            config: TableConfig {
                name: name.to_string(),
                selectable: true,
                gather: Some("gather {table}".to_string()),
                convert: Some("convert {table} {data_file}".to_string()),
                load: Some("load {table} {data_file}".to_string()),
                drop: Some("drop table {table}".to_string()),
                create: Some("create table {table}".to_string()),
                indexes: vec!["create index {table}_idx on {table}".to_string()],
                ..TableConfig::default()
            },
        }
    }

    /// Adds a clustering index together with cluster and optimize commands.
    pub fn clustered(mut self) -> Self {
        self.config.clustered_index = Some("create clustered index {table}_cl on {table}".into());
        self.config.cluster = Some("cluster {table}".to_string());
        self.config.optimize = Some("optimize {table}".to_string());
        self
    }

    /// Makes the table only receive files announced by other gather commands.
    pub fn derived(mut self) -> Self {
        self.config.selectable = false;
        self.config.gather = None;
        self
    }

    pub fn without_indexes(mut self) -> Self {
        self.config.indexes.clear();
        self
    }

    pub fn index(mut self, statement: &str) -> Self {
        self.config.indexes.push(statement.to_string());
        self
    }

    /// Adds a foreign key to `references`.
    pub fn foreign_key(mut self, references: &str) -> Self {
        self.config.foreign_keys.push(ForeignKeyConfig {
            references: references.to_string(),
            statement: format!("alter table {{table}} add foreign key references {references}"),
        });
        self
    }

    /// Adds a comment statement.
    pub fn comment(mut self, text: &str) -> Self {
        self.config
            .comments
            .push(format!("comment on table {{table}} is {text}"));
        self
    }

    pub fn into_config(self) -> TableConfig {
        self.config
    }
}

/// Builds the catalog configuration of `tables`.
pub fn test_catalog_config(tables: Vec<TestTable>) -> CatalogConfig {
    CatalogConfig {
        ddl_command: TEST_DDL_COMMAND.to_string(),
        tables: tables.into_iter().map(TestTable::into_config).collect(),
    }
}

/// Builds a [`ConfiguredCatalog`] of `tables`.
pub fn test_catalog(tables: Vec<TestTable>) -> ConfiguredCatalog {
    ConfiguredCatalog::new(test_catalog_config(tables))
}

/// Renders the stdout line announcing `data_file` for `table`.
pub fn announce(table: &str, data_file: &str) -> String {
    DataFileAnnouncement::new(table, data_file)
        .to_line()
        .expect("failed to render data file announcement")
}
