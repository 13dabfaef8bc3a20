//! Structural schema diffing.
//!
//! `diff` compares two snapshots and emits the operation sequence that
//! transforms the first into the second. Ordering is the correctness
//! contract: dependents are dropped before the objects they reference, and
//! referenced objects are created before anything that references them, so
//! executing the sequence top to bottom never hits a missing relation or
//! constraint.

use crate::ops::{Operation, TableOp};
use crate::schema::{Schema, TableDef};

/// Compute the ordered operation list that transforms `old` into `new`.
///
/// Nine fixed phases; every operation of an earlier phase precedes every
/// operation of a later phase. Within a phase, ordering follows table and
/// object names and carries no meaning.
///
/// Presence is full structural equality: an object whose definition changed
/// in any field is dropped and recreated. Renames are never inferred; a
/// renamed column looks like an unrelated drop plus add unless an explicit
/// rename operation is authored instead of diffing.
pub fn diff(old: &Schema, new: &Schema) -> Vec<Operation> {
    let mut ops = Vec::new();

    // 1. Drop foreign keys that are gone or changed.
    for (table_name, table) in &old.tables {
        let survivor = new.table(table_name);
        for (name, fk) in &table.foreign_keys {
            let kept = survivor.is_some_and(|t| t.foreign_keys.get(name) == Some(fk));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::DropForeignKey { name: name.clone() }],
                });
            }
        }
    }

    // 2. Drop primary keys and unique constraints that are gone or changed.
    for (table_name, table) in &old.tables {
        let survivor = new.table(table_name);
        if let Some(pk) = &table.primary_key {
            let kept = survivor.is_some_and(|t| t.primary_key.as_ref() == Some(pk));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::DropPrimaryKey],
                });
            }
        }
        for (name, unique) in &table.uniques {
            let kept = survivor.is_some_and(|t| t.uniques.get(name) == Some(unique));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::DropUnique { name: name.clone() }],
                });
            }
        }
    }

    // 3. Drop indexes that are gone or changed.
    for (table_name, table) in &old.tables {
        let survivor = new.table(table_name);
        for (name, index) in &table.indexes {
            let kept = survivor.is_some_and(|t| t.indexes.get(name) == Some(index));
            if !kept {
                ops.push(Operation::DropIndex { name: name.clone() });
            }
        }
    }

    // 4. Drop removed tables.
    for table_name in old.tables.keys() {
        if !new.contains_table(table_name) {
            ops.push(Operation::DropTable {
                table: table_name.clone(),
            });
        }
    }

    // 5. Column changes on surviving tables.
    for (table_name, old_table) in &old.tables {
        if let Some(new_table) = new.table(table_name) {
            let sub = diff_columns(old_table, new_table);
            if !sub.is_empty() {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: sub,
                });
            }
        }
    }

    // 6. Create new tables, columns only; their constraints and indexes are
    // picked up by the phases below as present-in-new, absent-in-old.
    for (table_name, table) in &new.tables {
        if !old.contains_table(table_name) {
            ops.push(Operation::CreateTable {
                table: table_name.clone(),
                columns: table.columns.clone(),
            });
        }
    }

    // 7. Create new or changed indexes.
    for (table_name, table) in &new.tables {
        let predecessor = old.table(table_name);
        for (name, index) in &table.indexes {
            let kept = predecessor.is_some_and(|t| t.indexes.get(name) == Some(index));
            if !kept {
                ops.push(Operation::CreateIndex {
                    table: table_name.clone(),
                    index: index.clone(),
                });
            }
        }
    }

    // 8. Create new or changed primary keys and unique constraints.
    for (table_name, table) in &new.tables {
        let predecessor = old.table(table_name);
        if let Some(pk) = &table.primary_key {
            let kept = predecessor.is_some_and(|t| t.primary_key.as_ref() == Some(pk));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::CreatePrimaryKey {
                        primary_key: pk.clone(),
                    }],
                });
            }
        }
        for (name, unique) in &table.uniques {
            let kept = predecessor.is_some_and(|t| t.uniques.get(name) == Some(unique));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::CreateUnique {
                        unique: unique.clone(),
                    }],
                });
            }
        }
    }

    // 9. Create new or changed foreign keys, after every table and column
    // they could reference exists.
    for (table_name, table) in &new.tables {
        let predecessor = old.table(table_name);
        for (name, fk) in &table.foreign_keys {
            let kept = predecessor.is_some_and(|t| t.foreign_keys.get(name) == Some(fk));
            if !kept {
                ops.push(Operation::AlterTable {
                    table: table_name.clone(),
                    ops: vec![TableOp::CreateForeignKey {
                        foreign_key: fk.clone(),
                    }],
                });
            }
        }
    }

    ops
}

/// Column-level diff for a table present on both sides: drops first, then
/// adds and per-attribute changes. Nullability, default, and type changes
/// each emit their own clause only when the attribute actually differs.
fn diff_columns(old: &TableDef, new: &TableDef) -> Vec<TableOp> {
    let mut ops = Vec::new();

    for name in old.columns.keys() {
        if !new.contains_column(name) {
            ops.push(TableOp::DropColumn { name: name.clone() });
        }
    }

    for (name, new_column) in &new.columns {
        match old.column(name) {
            None => ops.push(TableOp::AddColumn {
                name: name.clone(),
                column: new_column.clone(),
            }),
            Some(old_column) => {
                if old_column.sql_type != new_column.sql_type {
                    ops.push(TableOp::SetType {
                        name: name.clone(),
                        sql_type: new_column.sql_type.clone(),
                    });
                }
                if old_column.nullable != new_column.nullable {
                    if new_column.nullable {
                        ops.push(TableOp::SetNull { name: name.clone() });
                    } else {
                        ops.push(TableOp::SetNotNull { name: name.clone() });
                    }
                }
                if old_column.default != new_column.default {
                    if new_column.has_default() {
                        ops.push(TableOp::SetDefault {
                            name: name.clone(),
                            default: new_column.default.clone(),
                        });
                    } else {
                        ops.push(TableOp::DropDefault { name: name.clone() });
                    }
                }
            }
        }
    }

    ops
}
