use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Placeholder substituted with the shell-quoted statement in [`CatalogConfig::ddl_command`].
pub const STATEMENT_PLACEHOLDER: &str = "{statement}";

/// Placeholder substituted with the table name in per-table command templates.
pub const TABLE_PLACEHOLDER: &str = "{table}";

/// Placeholder substituted with the gathered data file in convert and load templates.
pub const DATA_FILE_PLACEHOLDER: &str = "{data_file}";

/// Tables known to the rebuild and how each one is processed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CatalogConfig {
    /// Command template used to run a single DDL statement against the target database.
    ///
    /// Must contain `{statement}`, which is replaced by the single-quoted statement.
    pub ddl_command: String,
    /// Declared tables, in catalog order.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl CatalogConfig {
    /// Returns the declaration of `name`, if any.
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Validates the DDL template, table uniqueness and foreign key references.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.ddl_command.contains(STATEMENT_PLACEHOLDER) {
            return Err(ValidationError::MissingStatementPlaceholder);
        }

        let mut names = HashSet::with_capacity(self.tables.len());
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                return Err(ValidationError::DuplicateTable(table.name.clone()));
            }
        }

        for table in &self.tables {
            for foreign_key in &table.foreign_keys {
                if !names.contains(foreign_key.references.as_str()) {
                    return Err(ValidationError::UnknownForeignKeyTable {
                        table: table.name.clone(),
                        references: foreign_key.references.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Declaration of a single front-end table.
///
/// Every command and statement is optional. A missing entry skips the corresponding stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    pub name: String,
    /// Whether the table is part of the default selection.
    ///
    /// Derived tables that are only ever announced by another table's gather command set this to
    /// `false`.
    #[serde(default = "default_selectable")]
    pub selectable: bool,
    #[serde(default)]
    pub gather: Option<String>,
    #[serde(default)]
    pub convert: Option<String>,
    #[serde(default)]
    pub load: Option<String>,
    #[serde(default)]
    pub drop: Option<String>,
    #[serde(default)]
    pub create: Option<String>,
    #[serde(default)]
    pub clustered_index: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub optimize: Option<String>,
    #[serde(default)]
    pub indexes: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyConfig>,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// A foreign key statement together with the table it references.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ForeignKeyConfig {
    pub references: String,
    pub statement: String,
}

fn default_selectable() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            selectable: true,
            ..TableConfig::default()
        }
    }

    fn catalog(tables: Vec<TableConfig>) -> CatalogConfig {
        CatalogConfig {
            ddl_command: "psql -c {statement}".to_string(),
            tables,
        }
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let config = catalog(vec![table("marker"), table("marker")]);

        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateTable("marker".to_string()))
        );
    }

    #[test]
    fn foreign_keys_must_reference_declared_tables() {
        let mut marker = table("marker");
        marker.foreign_keys.push(ForeignKeyConfig {
            references: "accession".to_string(),
            statement: "alter table marker add foreign key".to_string(),
        });
        let config = catalog(vec![marker]);

        assert_eq!(
            config.validate(),
            Err(ValidationError::UnknownForeignKeyTable {
                table: "marker".to_string(),
                references: "accession".to_string(),
            })
        );
    }

    #[test]
    fn ddl_command_requires_statement_placeholder() {
        let mut config = catalog(vec![table("marker")]);
        config.ddl_command = "psql".to_string();

        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingStatementPlaceholder)
        );
    }
}
