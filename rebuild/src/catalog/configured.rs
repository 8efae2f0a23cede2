use rebuild_config::shared::{
    CatalogConfig, DATA_FILE_PLACEHOLDER, STATEMENT_PLACEHOLDER, TABLE_PLACEHOLDER, TableConfig,
};

use crate::bail;
use crate::catalog::{Catalog, ForeignKeyStatement, TableDescriptor, TableSelection};
use crate::error::{ErrorKind, RebuildResult};

/// Quotes `value` as a single shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// [`TableDescriptor`] backed by a [`TableConfig`].
///
/// Command templates have `{table}` replaced by the table name and, for convert and load,
/// `{data_file}` replaced by the gathered file.
#[derive(Debug, Clone)]
pub struct ConfiguredTable {
    config: TableConfig,
}

impl ConfiguredTable {
    pub fn new(config: TableConfig) -> Self {
        Self { config }
    }

    pub fn is_selectable(&self) -> bool {
        self.config.selectable
    }

    fn render(&self, template: &str) -> String {
        template.replace(TABLE_PLACEHOLDER, &self.config.name)
    }

    fn render_with_file(&self, template: &str, data_file: &str) -> String {
        self.render(template)
            .replace(DATA_FILE_PLACEHOLDER, &shell_quote(data_file))
    }
}

impl TableDescriptor for ConfiguredTable {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn gather_command(&self) -> Option<String> {
        self.config.gather.as_deref().map(|t| self.render(t))
    }

    fn convert_command(&self, data_file: &str) -> Option<String> {
        self.config
            .convert
            .as_deref()
            .map(|t| self.render_with_file(t, data_file))
    }

    fn load_command(&self, data_file: &str) -> Option<String> {
        self.config
            .load
            .as_deref()
            .map(|t| self.render_with_file(t, data_file))
    }

    fn drop_statement(&self) -> Option<String> {
        self.config.drop.as_deref().map(|t| self.render(t))
    }

    fn create_statement(&self) -> Option<String> {
        self.config.create.as_deref().map(|t| self.render(t))
    }

    fn clustered_index_statement(&self) -> Option<String> {
        self.config.clustered_index.as_deref().map(|t| self.render(t))
    }

    fn cluster_statement(&self) -> Option<String> {
        self.config.cluster.as_deref().map(|t| self.render(t))
    }

    fn optimize_command(&self) -> Option<String> {
        self.config.optimize.as_deref().map(|t| self.render(t))
    }

    fn index_statements(&self) -> Vec<String> {
        self.config.indexes.iter().map(|t| self.render(t)).collect()
    }

    fn foreign_key_statements(&self) -> Vec<ForeignKeyStatement> {
        self.config
            .foreign_keys
            .iter()
            .map(|foreign_key| ForeignKeyStatement {
                references: foreign_key.references.clone(),
                statement: self.render(&foreign_key.statement),
            })
            .collect()
    }

    fn comment_statements(&self) -> Vec<String> {
        self.config.comments.iter().map(|t| self.render(t)).collect()
    }
}

/// [`Catalog`] built from the `catalog` configuration section.
#[derive(Debug, Clone)]
pub struct ConfiguredCatalog {
    ddl_command: String,
    tables: Vec<ConfiguredTable>,
}

impl ConfiguredCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            ddl_command: config.ddl_command,
            tables: config.tables.into_iter().map(ConfiguredTable::new).collect(),
        }
    }

    pub fn tables(&self) -> &[ConfiguredTable] {
        &self.tables
    }
}

impl Catalog for ConfiguredCatalog {
    type Descriptor = ConfiguredTable;

    fn discover(&self, selection: &TableSelection) -> RebuildResult<Vec<String>> {
        match selection {
            TableSelection::All => Ok(self
                .tables
                .iter()
                .filter(|table| table.is_selectable())
                .map(|table| table.name().to_string())
                .collect()),
            TableSelection::Only(names) => {
                let unknown = names
                    .iter()
                    .filter(|name| self.descriptor(name).is_none())
                    .cloned()
                    .collect::<Vec<_>>();
                if !unknown.is_empty() {
                    bail!(
                        ErrorKind::DiscoveryError,
                        "Requested tables are not declared in the catalog",
                        unknown.join(", ")
                    );
                }

                Ok(self
                    .tables
                    .iter()
                    .filter(|table| names.iter().any(|name| name == table.name()))
                    .map(|table| table.name().to_string())
                    .collect())
            }
        }
    }

    fn descriptor(&self, table: &str) -> Option<&ConfiguredTable> {
        self.tables.iter().find(|t| t.name() == table)
    }

    fn execute_ddl(&self, statement: &str) -> String {
        self.ddl_command
            .replace(STATEMENT_PLACEHOLDER, &shell_quote(statement))
    }
}

#[cfg(test)]
mod tests {
    use rebuild_config::shared::ForeignKeyConfig;

    use super::*;

    fn catalog() -> ConfiguredCatalog {
        ConfiguredCatalog::new(CatalogConfig {
            ddl_command: "psql -c {statement}".to_string(),
            tables: vec![
                TableConfig {
                    name: "marker".to_string(),
                    selectable: true,
                    gather: Some("extract {table}".to_string()),
                    load: Some("load {table} {data_file}".to_string()),
                    foreign_keys: vec![ForeignKeyConfig {
                        references: "accession".to_string(),
                        statement: "alter table {table} add foreign key".to_string(),
                    }],
                    ..TableConfig::default()
                },
                TableConfig {
                    name: "marker_alias".to_string(),
                    selectable: false,
                    ..TableConfig::default()
                },
                TableConfig {
                    name: "accession".to_string(),
                    selectable: true,
                    ..TableConfig::default()
                },
            ],
        })
    }

    #[test]
    fn templates_are_rendered_for_the_table() {
        let catalog = catalog();
        let marker = catalog.descriptor("marker").unwrap();

        assert_eq!(marker.gather_command().as_deref(), Some("extract marker"));
        assert_eq!(
            marker.load_command("/data/it's.tsv").as_deref(),
            Some(r"load marker '/data/it'\''s.tsv'")
        );
        assert_eq!(marker.convert_command("/data/marker.tsv"), None);
        assert_eq!(
            marker.foreign_key_statements()[0].statement,
            "alter table marker add foreign key"
        );
    }

    #[test]
    fn ddl_statements_are_quoted() {
        assert_eq!(
            catalog().execute_ddl("comment on table marker is 'markers'"),
            r"psql -c 'comment on table marker is '\''markers'\'''"
        );
    }

    #[test]
    fn default_selection_skips_derived_tables() {
        assert_eq!(
            catalog().discover(&TableSelection::All).unwrap(),
            vec!["marker", "accession"]
        );
    }

    #[test]
    fn explicit_selection_keeps_catalog_order() {
        let selection = TableSelection::Only(vec!["accession".to_string(), "marker".to_string()]);

        assert_eq!(
            catalog().discover(&selection).unwrap(),
            vec!["marker", "accession"]
        );
    }

    #[test]
    fn unknown_tables_fail_discovery() {
        let selection = TableSelection::Only(vec!["phenotype".to_string()]);

        let err = catalog().discover(&selection).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DiscoveryError);
        assert_eq!(err.detail(), Some("phenotype"));
    }
}
