use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{ColumnDef, ForeignKeyDef, PrimaryKeyDef, Schema, UniqueDef};

use super::{base_name, column_clause, quote_ident, quote_list, table_mut};

/// A single clause inside an ALTER TABLE statement.
///
/// Clauses render without the `ALTER TABLE <name>` prefix;
/// [`Operation::AlterTable`](super::Operation::AlterTable) joins them into one
/// statement and applies them in order against the same table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableOp {
    /// ADD COLUMN. A NOT NULL column always renders with a DEFAULT so rows
    /// already in the table satisfy the constraint without a backfill.
    AddColumn { name: String, column: ColumnDef },
    /// DROP COLUMN. Constraints and indexes of the same table that involve
    /// the column are dropped with it; an inbound foreign key from another
    /// table is an error.
    DropColumn { name: String },
    /// ALTER COLUMN ... SET NOT NULL.
    SetNotNull { name: String },
    /// ALTER COLUMN ... DROP NOT NULL.
    SetNull { name: String },
    /// ALTER COLUMN ... SET DEFAULT.
    SetDefault { name: String, default: String },
    /// ALTER COLUMN ... DROP DEFAULT.
    DropDefault { name: String },
    /// ALTER COLUMN ... TYPE.
    SetType { name: String, sql_type: String },
    /// ADD PRIMARY KEY. Columns must exist and be non-nullable; authors emit
    /// `SetNotNull` first when needed.
    CreatePrimaryKey { primary_key: PrimaryKeyDef },
    /// DROP CONSTRAINT on the default `<table>_pkey` name.
    DropPrimaryKey,
    /// ADD CONSTRAINT ... UNIQUE.
    CreateUnique { unique: UniqueDef },
    /// DROP CONSTRAINT for a unique constraint.
    DropUnique { name: String },
    /// ADD CONSTRAINT ... FOREIGN KEY. The referenced table and columns must
    /// exist and the column counts must match.
    CreateForeignKey { foreign_key: ForeignKeyDef },
    /// DROP CONSTRAINT for a foreign key.
    DropForeignKey { name: String },
}

impl TableOp {
    /// Render this clause for an ALTER TABLE on `table`.
    pub fn to_clause(&self, table: &str) -> String {
        match self {
            TableOp::AddColumn { name, column } => {
                format!("ADD COLUMN {}", column_clause(name, column))
            }
            TableOp::DropColumn { name } => format!("DROP COLUMN {}", quote_ident(name)),
            TableOp::SetNotNull { name } => {
                format!("ALTER COLUMN {} SET NOT NULL", quote_ident(name))
            }
            TableOp::SetNull { name } => {
                format!("ALTER COLUMN {} DROP NOT NULL", quote_ident(name))
            }
            TableOp::SetDefault { name, default } => {
                format!("ALTER COLUMN {} SET DEFAULT {}", quote_ident(name), default)
            }
            TableOp::DropDefault { name } => {
                format!("ALTER COLUMN {} DROP DEFAULT", quote_ident(name))
            }
            TableOp::SetType { name, sql_type } => {
                format!("ALTER COLUMN {} TYPE {}", quote_ident(name), sql_type)
            }
            TableOp::CreatePrimaryKey { primary_key } => {
                format!("ADD PRIMARY KEY ({})", quote_list(&primary_key.columns))
            }
            TableOp::DropPrimaryKey => {
                // PostgreSQL names the implicit constraint <table>_pkey.
                format!(
                    "DROP CONSTRAINT {}",
                    quote_ident(&format!("{}_pkey", base_name(table)))
                )
            }
            TableOp::CreateUnique { unique } => format!(
                "ADD CONSTRAINT {} UNIQUE ({})",
                quote_ident(&unique.name),
                quote_list(&unique.columns)
            ),
            TableOp::DropUnique { name } => format!("DROP CONSTRAINT {}", quote_ident(name)),
            TableOp::CreateForeignKey { foreign_key } => format!(
                "ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&foreign_key.name),
                quote_list(&foreign_key.columns),
                super::quote_table(&foreign_key.foreign_table),
                quote_list(&foreign_key.foreign_columns)
            ),
            TableOp::DropForeignKey { name } => format!("DROP CONSTRAINT {}", quote_ident(name)),
        }
    }

    /// Apply this clause to `table` inside `schema`, re-checking the DDL
    /// precondition against the current state.
    pub fn apply(&self, schema: &mut Schema, table: &str) -> Result<(), SchemaError> {
        match self {
            TableOp::AddColumn { name, column } => {
                let t = table_mut(schema, table)?;
                if t.contains_column(name) {
                    return Err(SchemaError::ColumnExists {
                        table: table.to_string(),
                        column: name.clone(),
                    });
                }
                t.columns.insert(name.clone(), column.clone());
                Ok(())
            }
            TableOp::DropColumn { name } => drop_column(schema, table, name),
            TableOp::SetNotNull { name } => {
                column_mut(schema, table, name)?.nullable = false;
                Ok(())
            }
            TableOp::SetNull { name } => {
                column_mut(schema, table, name)?.nullable = true;
                Ok(())
            }
            TableOp::SetDefault { name, default } => {
                column_mut(schema, table, name)?.default = default.clone();
                Ok(())
            }
            TableOp::DropDefault { name } => {
                column_mut(schema, table, name)?.default.clear();
                Ok(())
            }
            TableOp::SetType { name, sql_type } => {
                column_mut(schema, table, name)?.sql_type = sql_type.clone();
                Ok(())
            }
            TableOp::CreatePrimaryKey { primary_key } => {
                create_primary_key(schema, table, primary_key)
            }
            TableOp::DropPrimaryKey => {
                let t = table_mut(schema, table)?;
                if t.primary_key.is_none() {
                    return Err(SchemaError::PrimaryKeyNotFound(table.to_string()));
                }
                t.primary_key = None;
                Ok(())
            }
            TableOp::CreateUnique { unique } => create_unique(schema, table, unique),
            TableOp::DropUnique { name } => {
                let t = table_mut(schema, table)?;
                if t.uniques.remove(name).is_none() {
                    return Err(SchemaError::UniqueNotFound {
                        table: table.to_string(),
                        name: name.clone(),
                    });
                }
                Ok(())
            }
            TableOp::CreateForeignKey { foreign_key } => {
                create_foreign_key(schema, table, foreign_key)
            }
            TableOp::DropForeignKey { name } => {
                let t = table_mut(schema, table)?;
                if t.foreign_keys.remove(name).is_none() {
                    return Err(SchemaError::ForeignKeyNotFound {
                        table: table.to_string(),
                        name: name.clone(),
                    });
                }
                Ok(())
            }
        }
    }
}

fn column_mut<'a>(
    schema: &'a mut Schema,
    table: &str,
    column: &str,
) -> Result<&'a mut ColumnDef, SchemaError> {
    table_mut(schema, table)?
        .column_mut(column)
        .ok_or_else(|| SchemaError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })
}

fn drop_column(schema: &mut Schema, table: &str, name: &str) -> Result<(), SchemaError> {
    {
        let t = schema
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        if !t.contains_column(name) {
            return Err(SchemaError::ColumnNotFound {
                table: table.to_string(),
                column: name.to_string(),
            });
        }
    }
    // An inbound foreign key from another table blocks the drop, as it would
    // on a live database without CASCADE.
    for (other_name, other) in &schema.tables {
        if other_name == table {
            continue;
        }
        for fk in other.foreign_keys.values() {
            if fk.foreign_table == table && fk.foreign_columns.iter().any(|c| c == name) {
                return Err(SchemaError::ColumnReferenced {
                    table: table.to_string(),
                    column: name.to_string(),
                    foreign_key: fk.name.clone(),
                    by: other_name.clone(),
                });
            }
        }
    }

    let t = table_mut(schema, table)?;
    t.columns.remove(name);
    // Same-table dependents go with the column.
    if t
        .primary_key
        .as_ref()
        .is_some_and(|pk| pk.columns.iter().any(|c| c == name))
    {
        t.primary_key = None;
    }
    t.indexes.retain(|_, idx| !idx.columns.iter().any(|c| c == name));
    t.uniques.retain(|_, u| !u.columns.iter().any(|c| c == name));
    t.foreign_keys
        .retain(|_, fk| !fk.columns.iter().any(|c| c == name));
    Ok(())
}

fn create_primary_key(
    schema: &mut Schema,
    table: &str,
    primary_key: &PrimaryKeyDef,
) -> Result<(), SchemaError> {
    {
        let t = schema
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        if t.primary_key.is_some() {
            return Err(SchemaError::PrimaryKeyExists(table.to_string()));
        }
        for column in &primary_key.columns {
            match t.column(column) {
                None => {
                    return Err(SchemaError::ColumnNotFound {
                        table: table.to_string(),
                        column: column.clone(),
                    })
                }
                Some(c) if c.nullable => {
                    return Err(SchemaError::NullablePrimaryKeyColumn {
                        table: table.to_string(),
                        column: column.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }
    table_mut(schema, table)?.primary_key = Some(primary_key.clone());
    Ok(())
}

fn create_unique(schema: &mut Schema, table: &str, unique: &UniqueDef) -> Result<(), SchemaError> {
    {
        let t = schema
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        if t.uniques.contains_key(&unique.name) {
            return Err(SchemaError::UniqueExists {
                table: table.to_string(),
                name: unique.name.clone(),
            });
        }
        for column in &unique.columns {
            if !t.contains_column(column) {
                return Err(SchemaError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
    }
    table_mut(schema, table)?
        .uniques
        .insert(unique.name.clone(), unique.clone());
    Ok(())
}

fn create_foreign_key(
    schema: &mut Schema,
    table: &str,
    foreign_key: &ForeignKeyDef,
) -> Result<(), SchemaError> {
    if foreign_key.columns.len() != foreign_key.foreign_columns.len() {
        return Err(SchemaError::ForeignColumnCountMismatch {
            name: foreign_key.name.clone(),
            local: foreign_key.columns.len(),
            foreign: foreign_key.foreign_columns.len(),
        });
    }
    {
        let t = schema
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(table.to_string()))?;
        if t.foreign_keys.contains_key(&foreign_key.name) {
            return Err(SchemaError::ForeignKeyExists {
                table: table.to_string(),
                name: foreign_key.name.clone(),
            });
        }
        for column in &foreign_key.columns {
            if !t.contains_column(column) {
                return Err(SchemaError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
        let foreign = schema
            .table(&foreign_key.foreign_table)
            .ok_or_else(|| SchemaError::TableNotFound(foreign_key.foreign_table.clone()))?;
        for column in &foreign_key.foreign_columns {
            if !foreign.contains_column(column) {
                return Err(SchemaError::ColumnNotFound {
                    table: foreign_key.foreign_table.clone(),
                    column: column.clone(),
                });
            }
        }
    }
    table_mut(schema, table)?
        .foreign_keys
        .insert(foreign_key.name.clone(), foreign_key.clone());
    Ok(())
}
