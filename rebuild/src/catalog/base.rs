use crate::error::RebuildResult;

/// Which tables a run rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TableSelection {
    /// Every table the catalog selects by default.
    #[default]
    All,
    /// Only the named tables.
    Only(Vec<String>),
}

/// A foreign key statement of a table together with the other table it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyStatement {
    pub references: String,
    pub statement: String,
}

/// Commands and statements that rebuild one table.
///
/// Every query is asked at most once per table, when the table reaches the matching stage. An
/// empty answer skips the stage.
pub trait TableDescriptor {
    fn name(&self) -> &str;

    /// Command extracting the table's data, announcing every produced file on stdout.
    ///
    /// Tables without one only receive data files announced by other tables' gather commands.
    fn gather_command(&self) -> Option<String>;

    fn convert_command(&self, data_file: &str) -> Option<String>;

    fn load_command(&self, data_file: &str) -> Option<String>;

    fn drop_statement(&self) -> Option<String>;

    fn create_statement(&self) -> Option<String>;

    /// Statement creating the clustering index. Without one, clustering and optimizing are
    /// skipped.
    fn clustered_index_statement(&self) -> Option<String>;

    fn cluster_statement(&self) -> Option<String>;

    fn optimize_command(&self) -> Option<String>;

    fn index_statements(&self) -> Vec<String>;

    fn foreign_key_statements(&self) -> Vec<ForeignKeyStatement>;

    fn comment_statements(&self) -> Vec<String>;
}

/// Source of table descriptors and of the command running raw DDL.
pub trait Catalog {
    type Descriptor: TableDescriptor;

    /// Returns the names of the tables selected for rebuild, in catalog order.
    fn discover(&self, selection: &TableSelection) -> RebuildResult<Vec<String>>;

    /// Returns the descriptor of `table`, if the catalog knows it.
    fn descriptor(&self, table: &str) -> Option<&Self::Descriptor>;

    /// Wraps a raw statement into a command executing it against the target database.
    fn execute_ddl(&self, statement: &str) -> String;
}
