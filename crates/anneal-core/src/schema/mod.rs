mod table;

pub use table::{ColumnDef, ForeignKeyDef, IndexDef, PrimaryKeyDef, TableDef, UniqueDef};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An in-memory snapshot of a relational schema: tables keyed by name.
///
/// A snapshot is a plain value. The differ takes two snapshots by reference
/// and never mutates either; operations mutate a snapshot in place when
/// replaying migration history or simulating a plan.
///
/// Tables are kept in a `BTreeMap` so iteration, diff output, and rendered
/// SQL are deterministically ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// All tables, keyed by table name.
    pub tables: BTreeMap<String, TableDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Look up a table for mutation.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.get_mut(name)
    }

    /// Check whether a table exists.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Structural JSON dump, for debugging and test assertions.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("schema model is always serializable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_schema() {
        let schema = Schema::new();
        assert!(schema.tables.is_empty());
        assert!(schema.table("users").is_none());
        assert!(!schema.contains_table("users"));
    }

    #[test]
    fn test_table_lookup() {
        let mut schema = Schema::new();
        let mut table = TableDef::new();
        table
            .columns
            .insert("id".to_string(), ColumnDef::new("integer"));
        schema.tables.insert("users".to_string(), table);

        assert!(schema.contains_table("users"));
        assert!(schema.table("users").unwrap().contains_column("id"));
        assert!(schema.table("posts").is_none());
    }

    #[test]
    fn test_json_dump_shape() {
        let mut schema = Schema::new();
        let mut table = TableDef::new();
        table
            .columns
            .insert("id".to_string(), ColumnDef::new("integer"));
        schema.tables.insert("users".to_string(), table);

        let value = schema.to_json_value();
        assert!(value["tables"]["users"]["columns"]["id"].is_object());
        assert_eq!(
            value["tables"]["users"]["columns"]["id"]["sql_type"],
            "integer"
        );
    }
}
