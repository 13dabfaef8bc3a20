use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Definition of a single table: its columns plus the constraints and indexes
/// that hang off it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Columns keyed by column name.
    pub columns: BTreeMap<String, ColumnDef>,

    /// At most one primary key.
    pub primary_key: Option<PrimaryKeyDef>,

    /// Indexes keyed by index name.
    pub indexes: BTreeMap<String, IndexDef>,

    /// Unique constraints keyed by constraint name.
    pub uniques: BTreeMap<String, UniqueDef>,

    /// Foreign keys keyed by constraint name.
    pub foreign_keys: BTreeMap<String, ForeignKeyDef>,
}

impl TableDef {
    /// Create an empty table definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    /// Look up a column for mutation.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.get_mut(name)
    }

    /// Check whether a column exists.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// Definition of a column.
///
/// The SQL type is carried as an opaque string. The differ compares type and
/// default strings verbatim; it never interprets them, so `0` and `0.0` are
/// different defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// SQL type, verbatim (e.g. `integer`, `varchar(255)`).
    pub sql_type: String,

    /// Whether NULL is allowed.
    pub nullable: bool,

    /// Default expression, verbatim. Empty string means no default.
    pub default: String,
}

impl ColumnDef {
    /// Create a non-nullable column of the given type with no default.
    pub fn new(sql_type: &str) -> Self {
        Self {
            sql_type: sql_type.to_string(),
            nullable: false,
            default: String::new(),
        }
    }

    /// Whether the column carries an explicit default expression.
    pub fn has_default(&self) -> bool {
        !self.default.is_empty()
    }
}

/// Primary key: an ordered list of column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDef {
    pub columns: Vec<String>,
}

impl PrimaryKeyDef {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name; unique per table.
    pub name: String,

    /// Ordered indexed columns.
    pub columns: Vec<String>,

    /// Whether this is a UNIQUE index.
    pub unique: bool,

    /// Index method (e.g. `gin`); None for the server default.
    pub method: Option<String>,

    /// Partial-index predicate, verbatim; None for a full index.
    pub predicate: Option<String>,
}

impl IndexDef {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            method: None,
            predicate: None,
        }
    }
}

/// Unique constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueDef {
    /// Constraint name; unique per table.
    pub name: String,

    /// Ordered constrained columns.
    pub columns: Vec<String>,
}

impl UniqueDef {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Foreign key definition.
///
/// Local and foreign column lists are positional pairs and must have the same
/// length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name; unique per table.
    pub name: String,

    /// Ordered local columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub foreign_table: String,

    /// Ordered referenced columns.
    pub foreign_columns: Vec<String>,
}

impl ForeignKeyDef {
    pub fn new(name: &str, columns: &[&str], foreign_table: &str, foreign_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            foreign_table: foreign_table.to_string(),
            foreign_columns: foreign_columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}
