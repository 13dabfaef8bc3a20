mod alter;

pub use alter::TableOp;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{ColumnDef, IndexDef, Schema, TableDef};

/// A single schema-changing operation.
///
/// The set is closed: every variant renders its own SQL statement and can
/// apply itself to an in-memory [`Schema`], failing with a typed
/// [`SchemaError`] when the precondition implied by the DDL does not hold.
/// Apply is used both to simulate a plan before execution and to replay full
/// migration histories from an empty schema, so every variant re-checks
/// existence defensively instead of trusting the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// CREATE TABLE with the full column set. Constraints and indexes are
    /// separate operations so they can be ordered after every table they
    /// reference exists.
    CreateTable {
        table: String,
        columns: BTreeMap<String, ColumnDef>,
    },
    /// DROP TABLE. Fails while another table still references this one.
    DropTable { table: String },
    /// ALTER TABLE wrapping one or more suboperations in a single statement.
    AlterTable { table: String, ops: Vec<TableOp> },
    /// CREATE [UNIQUE] INDEX.
    CreateIndex { table: String, index: IndexDef },
    /// DROP INDEX. Index names are database-global, so only the name is
    /// carried; apply locates the owning table.
    DropIndex { name: String },
    /// ALTER TABLE ... RENAME COLUMN. References to the column in the
    /// table's own constraints and in other tables' foreign keys follow the
    /// rename, as they do in the live catalog.
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    /// ALTER TABLE ... RENAME TO. Foreign keys referencing the table follow.
    RenameTable { from: String, to: String },
    /// ALTER TABLE ... SET SCHEMA. The table is re-keyed under
    /// `<schema>.<base name>`; foreign keys referencing it follow.
    SetTableSchema { table: String, schema: String },
    /// Escape hatch: verbatim SQL. Has no effect on the in-memory model.
    RawSql { sql: String },
}

impl Operation {
    /// Render this operation as one SQL statement, identifier-quoted and
    /// deterministically ordered.
    pub fn to_sql(&self) -> String {
        match self {
            Operation::CreateTable { table, columns } => {
                if columns.is_empty() {
                    return format!("CREATE TABLE {} ();", quote_table(table));
                }
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|(name, column)| column_clause(name, column))
                    .collect();
                format!(
                    "CREATE TABLE {} (\n    {}\n);",
                    quote_table(table),
                    clauses.join(",\n    ")
                )
            }
            Operation::DropTable { table } => format!("DROP TABLE {};", quote_table(table)),
            Operation::AlterTable { table, ops } => {
                let clauses: Vec<String> = ops.iter().map(|op| op.to_clause(table)).collect();
                format!("ALTER TABLE {} {};", quote_table(table), clauses.join(", "))
            }
            Operation::CreateIndex { table, index } => {
                let mut sql = String::from("CREATE ");
                if index.unique {
                    sql.push_str("UNIQUE ");
                }
                sql.push_str("INDEX ");
                sql.push_str(&quote_ident(&index.name));
                sql.push_str(" ON ");
                sql.push_str(&quote_table(table));
                if let Some(method) = &index.method {
                    sql.push_str(" USING ");
                    sql.push_str(method);
                }
                sql.push_str(&format!(" ({})", quote_list(&index.columns)));
                if let Some(predicate) = &index.predicate {
                    sql.push_str(" WHERE ");
                    sql.push_str(predicate);
                }
                sql.push(';');
                sql
            }
            Operation::DropIndex { name } => format!("DROP INDEX {};", quote_ident(name)),
            Operation::RenameColumn { table, from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                quote_table(table),
                quote_ident(from),
                quote_ident(to)
            ),
            Operation::RenameTable { from, to } => format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_table(from),
                quote_ident(base_name(to))
            ),
            Operation::SetTableSchema { table, schema } => format!(
                "ALTER TABLE {} SET SCHEMA {};",
                quote_table(table),
                quote_ident(schema)
            ),
            Operation::RawSql { sql } => sql.clone(),
        }
    }

    /// Apply this operation to `schema` in place.
    pub fn apply(&self, schema: &mut Schema) -> Result<(), SchemaError> {
        match self {
            Operation::CreateTable { table, columns } => {
                if schema.contains_table(table) {
                    return Err(SchemaError::TableExists(table.clone()));
                }
                let def = TableDef {
                    columns: columns.clone(),
                    ..TableDef::default()
                };
                schema.tables.insert(table.clone(), def);
                Ok(())
            }
            Operation::DropTable { table } => drop_table(schema, table),
            Operation::AlterTable { table, ops } => {
                if !schema.contains_table(table) {
                    return Err(SchemaError::TableNotFound(table.clone()));
                }
                for op in ops {
                    op.apply(schema, table).map_err(|e| SchemaError::AlterTable {
                        table: table.clone(),
                        op: op.to_clause(table),
                        source: Box::new(e),
                    })?;
                }
                Ok(())
            }
            Operation::CreateIndex { table, index } => create_index(schema, table, index),
            Operation::DropIndex { name } => {
                for t in schema.tables.values_mut() {
                    if t.indexes.remove(name).is_some() {
                        return Ok(());
                    }
                }
                Err(SchemaError::IndexNotFound(name.clone()))
            }
            Operation::RenameColumn { table, from, to } => rename_column(schema, table, from, to),
            Operation::RenameTable { from, to } => move_table(schema, from, to),
            Operation::SetTableSchema { table, schema: target } => {
                let to = format!("{}.{}", target, base_name(table));
                move_table(schema, table, &to)
            }
            Operation::RawSql { .. } => Ok(()),
        }
    }
}

fn drop_table(schema: &mut Schema, table: &str) -> Result<(), SchemaError> {
    if !schema.contains_table(table) {
        return Err(SchemaError::TableNotFound(table.to_string()));
    }
    // A live database refuses to drop a table other tables still reference.
    for (other_name, other) in &schema.tables {
        if other_name == table {
            continue;
        }
        for fk in other.foreign_keys.values() {
            if fk.foreign_table == table {
                return Err(SchemaError::TableReferenced {
                    table: table.to_string(),
                    foreign_key: fk.name.clone(),
                    by: other_name.clone(),
                });
            }
        }
    }
    schema.tables.remove(table);
    Ok(())
}

fn create_index(schema: &mut Schema, table: &str, index: &IndexDef) -> Result<(), SchemaError> {
    // Index names are global, so reject reuse anywhere in the schema.
    for t in schema.tables.values() {
        if t.indexes.contains_key(&index.name) {
            return Err(SchemaError::IndexExists(index.name.clone()));
        }
    }
    {
        let t = schema
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        for column in &index.columns {
            if !t.contains_column(column) {
                return Err(SchemaError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
    }
    table_mut(schema, table)?
        .indexes
        .insert(index.name.clone(), index.clone());
    Ok(())
}

fn rename_column(schema: &mut Schema, table: &str, from: &str, to: &str) -> Result<(), SchemaError> {
    {
        let t = table_mut(schema, table)?;
        if !t.contains_column(from) {
            return Err(SchemaError::ColumnNotFound {
                table: table.to_string(),
                column: from.to_string(),
            });
        }
        if t.contains_column(to) {
            return Err(SchemaError::ColumnExists {
                table: table.to_string(),
                column: to.to_string(),
            });
        }
        if let Some(column) = t.columns.remove(from) {
            t.columns.insert(to.to_string(), column);
        }
        if let Some(pk) = &mut t.primary_key {
            rename_in(&mut pk.columns, from, to);
        }
        for idx in t.indexes.values_mut() {
            rename_in(&mut idx.columns, from, to);
        }
        for u in t.uniques.values_mut() {
            rename_in(&mut u.columns, from, to);
        }
        for fk in t.foreign_keys.values_mut() {
            rename_in(&mut fk.columns, from, to);
        }
    }
    // Inbound foreign keys track the rename.
    for t in schema.tables.values_mut() {
        for fk in t.foreign_keys.values_mut() {
            if fk.foreign_table == table {
                rename_in(&mut fk.foreign_columns, from, to);
            }
        }
    }
    Ok(())
}

fn move_table(schema: &mut Schema, from: &str, to: &str) -> Result<(), SchemaError> {
    if schema.contains_table(to) {
        return Err(SchemaError::TableExists(to.to_string()));
    }
    let Some(table) = schema.tables.remove(from) else {
        return Err(SchemaError::TableNotFound(from.to_string()));
    };
    schema.tables.insert(to.to_string(), table);
    for t in schema.tables.values_mut() {
        for fk in t.foreign_keys.values_mut() {
            if fk.foreign_table == from {
                fk.foreign_table = to.to_string();
            }
        }
    }
    Ok(())
}

fn rename_in(columns: &mut [String], from: &str, to: &str) {
    for column in columns.iter_mut() {
        if column == from {
            *column = to.to_string();
        }
    }
}

pub(crate) fn table_mut<'a>(
    schema: &'a mut Schema,
    table: &str,
) -> Result<&'a mut TableDef, SchemaError> {
    schema
        .table_mut(table)
        .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))
}

/// Quote a SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name part by part.
pub(crate) fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote and comma-join a column list.
pub(crate) fn quote_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The unqualified part of a possibly schema-qualified table name.
pub(crate) fn base_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// Render a column clause: name, type, nullability, default.
///
/// A NOT NULL column always carries a DEFAULT (the explicit one, or a
/// zero value derived from the type) so rows present before an ADD COLUMN
/// satisfy the constraint without a backfill. Nullable columns only render
/// a DEFAULT when one was set explicitly.
pub(crate) fn column_clause(name: &str, column: &ColumnDef) -> String {
    let mut parts = vec![quote_ident(name), column.sql_type.clone()];
    if !column.nullable {
        parts.push("NOT NULL".to_string());
        parts.push(format!("DEFAULT {}", effective_default(column)));
    } else if column.has_default() {
        parts.push(format!("DEFAULT {}", column.default));
    }
    parts.join(" ")
}

fn effective_default(column: &ColumnDef) -> String {
    if column.has_default() {
        return column.default.clone();
    }
    default_for_type(&column.sql_type)
}

/// A zero value for an opaque SQL type string, by keyword sniffing.
fn default_for_type(sql_type: &str) -> String {
    let ty = sql_type.to_ascii_lowercase();
    if ty.contains("bool") {
        "false".to_string()
    } else if ty.contains("timestamp") || ty.contains("date") || ty.contains("time") {
        "now()".to_string()
    } else if ty.contains("json") {
        "'{}'".to_string()
    } else if ty.contains("int") || ty.contains("serial") {
        "0".to_string()
    } else if ty.contains("real")
        || ty.contains("double")
        || ty.contains("float")
        || ty.contains("numeric")
        || ty.contains("decimal")
    {
        "0.0".to_string()
    } else {
        // text, varchar, uuid-as-text and anything unrecognized
        "''".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyDef, PrimaryKeyDef};

    fn users_columns() -> BTreeMap<String, ColumnDef> {
        let mut columns = BTreeMap::new();
        columns.insert("id".to_string(), ColumnDef::new("integer"));
        let mut name = ColumnDef::new("text");
        name.default = "''".to_string();
        columns.insert("name".to_string(), name);
        columns
    }

    #[test]
    fn test_create_table_sql() {
        let op = Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        };
        assert_eq!(
            op.to_sql(),
            "CREATE TABLE \"users\" (\n    \"id\" integer NOT NULL DEFAULT 0,\n    \"name\" text NOT NULL DEFAULT ''\n);"
        );
    }

    #[test]
    fn test_create_table_apply_rejects_existing() {
        let mut schema = Schema::new();
        let op = Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        };
        op.apply(&mut schema).unwrap();
        assert_eq!(
            op.apply(&mut schema),
            Err(SchemaError::TableExists("users".to_string()))
        );
    }

    #[test]
    fn test_drop_table_requires_existence() {
        let mut schema = Schema::new();
        let op = Operation::DropTable {
            table: "users".to_string(),
        };
        assert_eq!(
            op.apply(&mut schema),
            Err(SchemaError::TableNotFound("users".to_string()))
        );
    }

    #[test]
    fn test_drop_table_blocked_by_inbound_foreign_key() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        }
        .apply(&mut schema)
        .unwrap();
        let mut posts_columns = BTreeMap::new();
        posts_columns.insert("author_id".to_string(), ColumnDef::new("integer"));
        Operation::CreateTable {
            table: "posts".to_string(),
            columns: posts_columns,
        }
        .apply(&mut schema)
        .unwrap();
        Operation::AlterTable {
            table: "posts".to_string(),
            ops: vec![TableOp::CreateForeignKey {
                foreign_key: ForeignKeyDef::new("fk_posts_author", &["author_id"], "users", &["id"]),
            }],
        }
        .apply(&mut schema)
        .unwrap();

        let err = Operation::DropTable {
            table: "users".to_string(),
        }
        .apply(&mut schema)
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TableReferenced {
                table: "users".to_string(),
                foreign_key: "fk_posts_author".to_string(),
                by: "posts".to_string(),
            }
        );
    }

    #[test]
    fn test_alter_table_joins_clauses_into_one_statement() {
        let op = Operation::AlterTable {
            table: "users".to_string(),
            ops: vec![
                TableOp::DropColumn {
                    name: "name".to_string(),
                },
                TableOp::SetNotNull {
                    name: "id".to_string(),
                },
            ],
        };
        assert_eq!(
            op.to_sql(),
            "ALTER TABLE \"users\" DROP COLUMN \"name\", ALTER COLUMN \"id\" SET NOT NULL;"
        );
    }

    #[test]
    fn test_alter_table_wraps_suboperation_failure() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        }
        .apply(&mut schema)
        .unwrap();

        let op = Operation::AlterTable {
            table: "users".to_string(),
            ops: vec![TableOp::DropColumn {
                name: "email".to_string(),
            }],
        };
        let err = op.apply(&mut schema).unwrap_err();
        match err {
            SchemaError::AlterTable { table, op, source } => {
                assert_eq!(table, "users");
                assert_eq!(op, "DROP COLUMN \"email\"");
                assert_eq!(
                    *source,
                    SchemaError::ColumnNotFound {
                        table: "users".to_string(),
                        column: "email".to_string(),
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_create_index_sql_variants() {
        let mut index = IndexDef::new("users_email_key", &["email"]);
        index.unique = true;
        let op = Operation::CreateIndex {
            table: "users".to_string(),
            index,
        };
        assert_eq!(
            op.to_sql(),
            "CREATE UNIQUE INDEX \"users_email_key\" ON \"users\" (\"email\");"
        );

        let mut partial = IndexDef::new("users_active_idx", &["name"]);
        partial.method = Some("btree".to_string());
        partial.predicate = Some("deleted_at IS NULL".to_string());
        let op = Operation::CreateIndex {
            table: "users".to_string(),
            index: partial,
        };
        assert_eq!(
            op.to_sql(),
            "CREATE INDEX \"users_active_idx\" ON \"users\" USING btree (\"name\") WHERE deleted_at IS NULL;"
        );
    }

    #[test]
    fn test_drop_index_resolves_owner_by_name() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        }
        .apply(&mut schema)
        .unwrap();
        Operation::CreateIndex {
            table: "users".to_string(),
            index: IndexDef::new("users_name_idx", &["name"]),
        }
        .apply(&mut schema)
        .unwrap();

        Operation::DropIndex {
            name: "users_name_idx".to_string(),
        }
        .apply(&mut schema)
        .unwrap();
        assert!(schema.table("users").unwrap().indexes.is_empty());

        assert_eq!(
            Operation::DropIndex {
                name: "users_name_idx".to_string(),
            }
            .apply(&mut schema),
            Err(SchemaError::IndexNotFound("users_name_idx".to_string()))
        );
    }

    #[test]
    fn test_rename_column_tracks_references() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        }
        .apply(&mut schema)
        .unwrap();
        schema.table_mut("users").unwrap().primary_key = Some(PrimaryKeyDef::new(&["id"]));
        let mut posts_columns = BTreeMap::new();
        posts_columns.insert("author_id".to_string(), ColumnDef::new("integer"));
        Operation::CreateTable {
            table: "posts".to_string(),
            columns: posts_columns,
        }
        .apply(&mut schema)
        .unwrap();
        Operation::AlterTable {
            table: "posts".to_string(),
            ops: vec![TableOp::CreateForeignKey {
                foreign_key: ForeignKeyDef::new("fk_posts_author", &["author_id"], "users", &["id"]),
            }],
        }
        .apply(&mut schema)
        .unwrap();

        Operation::RenameColumn {
            table: "users".to_string(),
            from: "id".to_string(),
            to: "user_id".to_string(),
        }
        .apply(&mut schema)
        .unwrap();

        let users = schema.table("users").unwrap();
        assert!(users.contains_column("user_id"));
        assert_eq!(users.primary_key.as_ref().unwrap().columns, vec!["user_id"]);
        let fk = schema
            .table("posts")
            .unwrap()
            .foreign_keys
            .get("fk_posts_author")
            .unwrap();
        assert_eq!(fk.foreign_columns, vec!["user_id"]);
    }

    #[test]
    fn test_rename_table_tracks_foreign_tables() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "users".to_string(),
            columns: users_columns(),
        }
        .apply(&mut schema)
        .unwrap();
        let mut posts_columns = BTreeMap::new();
        posts_columns.insert("author_id".to_string(), ColumnDef::new("integer"));
        Operation::CreateTable {
            table: "posts".to_string(),
            columns: posts_columns,
        }
        .apply(&mut schema)
        .unwrap();
        Operation::AlterTable {
            table: "posts".to_string(),
            ops: vec![TableOp::CreateForeignKey {
                foreign_key: ForeignKeyDef::new("fk_posts_author", &["author_id"], "users", &["id"]),
            }],
        }
        .apply(&mut schema)
        .unwrap();

        Operation::RenameTable {
            from: "users".to_string(),
            to: "accounts".to_string(),
        }
        .apply(&mut schema)
        .unwrap();

        assert!(schema.contains_table("accounts"));
        assert!(!schema.contains_table("users"));
        assert_eq!(
            schema
                .table("posts")
                .unwrap()
                .foreign_keys
                .get("fk_posts_author")
                .unwrap()
                .foreign_table,
            "accounts"
        );
    }

    #[test]
    fn test_set_table_schema_requalifies_name() {
        let mut schema = Schema::new();
        Operation::CreateTable {
            table: "events".to_string(),
            columns: BTreeMap::new(),
        }
        .apply(&mut schema)
        .unwrap();

        let op = Operation::SetTableSchema {
            table: "events".to_string(),
            schema: "analytics".to_string(),
        };
        assert_eq!(op.to_sql(), "ALTER TABLE \"events\" SET SCHEMA \"analytics\";");
        op.apply(&mut schema).unwrap();
        assert!(schema.contains_table("analytics.events"));
        assert!(!schema.contains_table("events"));
    }

    #[test]
    fn test_raw_sql_passthrough() {
        let op = Operation::RawSql {
            sql: "UPDATE users SET name = '' WHERE name IS NULL;".to_string(),
        };
        assert_eq!(op.to_sql(), "UPDATE users SET name = '' WHERE name IS NULL;");
        let mut schema = Schema::new();
        op.apply(&mut schema).unwrap();
        assert_eq!(schema, Schema::new());
    }

    #[test]
    fn test_quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
        assert_eq!(quote_table("analytics.events"), "\"analytics\".\"events\"");
    }

    #[test]
    fn test_default_for_type_sniffing() {
        assert_eq!(default_for_type("integer"), "0");
        assert_eq!(default_for_type("bigint"), "0");
        assert_eq!(default_for_type("boolean"), "false");
        assert_eq!(default_for_type("timestamptz"), "now()");
        assert_eq!(default_for_type("double precision"), "0.0");
        assert_eq!(default_for_type("jsonb"), "'{}'");
        assert_eq!(default_for_type("text"), "''");
        assert_eq!(default_for_type("varchar(255)"), "''");
    }
}
