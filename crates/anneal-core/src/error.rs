use thiserror::Error;

/// Error raised when an operation is applied to a schema whose state does not
/// match the operation's precondition.
///
/// These signal drift between the assumed and actual schema and are always
/// returned to the caller, never panicked: the same `apply` code path is used
/// to replay full migration histories, where a precondition failure means a
/// migration was authored against the wrong snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("column {table}.{column} already exists")]
    ColumnExists { table: String, column: String },

    #[error("column {table}.{column} does not exist")]
    ColumnNotFound { table: String, column: String },

    #[error("table {0} already has a primary key")]
    PrimaryKeyExists(String),

    #[error("table {0} has no primary key")]
    PrimaryKeyNotFound(String),

    #[error("primary key column {table}.{column} is nullable")]
    NullablePrimaryKeyColumn { table: String, column: String },

    #[error("index {0} already exists")]
    IndexExists(String),

    #[error("index {0} does not exist")]
    IndexNotFound(String),

    #[error("unique constraint {name} on {table} already exists")]
    UniqueExists { table: String, name: String },

    #[error("unique constraint {name} on {table} does not exist")]
    UniqueNotFound { table: String, name: String },

    #[error("foreign key {name} on {table} already exists")]
    ForeignKeyExists { table: String, name: String },

    #[error("foreign key {name} on {table} does not exist")]
    ForeignKeyNotFound { table: String, name: String },

    #[error("foreign key {name} has {local} local column(s) but {foreign} foreign column(s)")]
    ForeignColumnCountMismatch {
        name: String,
        local: usize,
        foreign: usize,
    },

    #[error("table {table} is still referenced by foreign key {foreign_key} on {by}")]
    TableReferenced {
        table: String,
        foreign_key: String,
        by: String,
    },

    #[error("column {table}.{column} is still referenced by foreign key {foreign_key} on {by}")]
    ColumnReferenced {
        table: String,
        column: String,
        foreign_key: String,
        by: String,
    },

    /// Wraps the first suboperation failure inside an ALTER TABLE, naming the
    /// table and the suboperation that failed.
    #[error("alter table {table}, {op}: {source}")]
    AlterTable {
        table: String,
        op: String,
        #[source]
        source: Box<SchemaError>,
    },
}
