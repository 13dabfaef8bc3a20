//! Applies pending migrations against a live PostgreSQL database.
//!
//! The runner ties together the store, the scheduler, and the ledger table
//! that records what has already been applied. Each migration's DDL and its
//! ledger insert commit in one transaction, so a crash can never leave a
//! migration applied-but-unrecorded or recorded-but-unapplied.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::scheduler;
use crate::store::{Migration, MigrationStore};

/// Idempotent bootstrap DDL for the ledger table. Row existence is the
/// applied-flag; there is no other state.
const LEDGER_DDL: &str = "\
CREATE TABLE IF NOT EXISTS anneal_migrations (
    name TEXT PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

/// A row of the ledger table.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Executes pending migrations strictly sequentially against one database.
///
/// Concurrent runners against the same database are an unsupported
/// configuration; nothing here locks the ledger across processes.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bring the database up to the store's single head.
    ///
    /// Returns the names applied by this call, in execution order; an empty
    /// list means the database was already up to date. Graph and ledger
    /// problems fail before any SQL runs; an execution failure aborts the
    /// run and rolls back only the migration it happened in.
    pub async fn run(&self, store: &MigrationStore) -> Result<Vec<String>> {
        store.validate()?;
        let head = single_head(store)?;

        self.ensure_ledger().await?;
        let ledger = self.applied_migrations().await?;
        let applied: HashSet<String> = ledger.into_iter().map(|row| row.name).collect();
        debug!("ledger lists {} applied migration(s)", applied.len());

        verify_applied_consistency(store, &applied)?;

        let plan = scheduler::execution_plan(store, &head, &applied)?;
        if plan.is_empty() {
            info!("database is up to date at {}", head);
            return Ok(plan);
        }

        for name in &plan {
            let migration = store.get(name).expect("planned names are registered");
            self.apply_migration(migration).await?;
        }
        info!("applied {} migration(s), head is {}", plan.len(), head);
        Ok(plan)
    }

    /// Create the ledger table if this is the first run against the database.
    pub async fn ensure_ledger(&self) -> Result<()> {
        sqlx::query(LEDGER_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("failed to create ledger table: {}", e)))?;
        Ok(())
    }

    /// Load the full ledger, oldest first.
    pub async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let rows = sqlx::query("SELECT name, applied_at FROM anneal_migrations ORDER BY applied_at, name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("failed to read ledger: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| AppliedMigration {
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            })
            .collect())
    }

    /// Execute one migration's operations and its ledger insert inside a
    /// single transaction.
    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        info!(
            "applying migration {} ({} operation(s))",
            migration.name,
            migration.operations.len()
        );

        let mut tx = self.pool.begin().await?;
        for operation in &migration.operations {
            let sql = operation.to_sql();
            debug!("migration {}: {}", migration.name, sql);
            sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                MigrateError::Database(format!("migration {} failed: {}", migration.name, e))
            })?;
        }
        sqlx::query("INSERT INTO anneal_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                MigrateError::Database(format!(
                    "failed to record migration {}: {}",
                    migration.name, e
                ))
            })?;
        tx.commit().await?;

        info!("migration {} applied", migration.name);
        Ok(())
    }
}

/// The store's single head, or an error when there are zero or several.
///
/// Several heads mean the migration history has diverged (two branches each
/// added migrations); picking one silently would leave the other branch
/// unapplied, so the run refuses instead.
fn single_head(store: &MigrationStore) -> Result<String> {
    let mut heads = store.heads();
    match heads.len() {
        0 => Err(MigrateError::NoMigrations),
        1 => Ok(heads.remove(0)),
        _ => Err(MigrateError::AmbiguousHeads(heads)),
    }
}

/// Check that the ledger could have been produced by this store: every
/// applied name is registered here, and every applied migration's
/// dependencies are applied too. A violation means the ledger belongs to a
/// different history and running against it would corrupt the database.
pub fn verify_applied_consistency(
    store: &MigrationStore,
    applied: &HashSet<String>,
) -> Result<()> {
    let mut names: Vec<&String> = applied.iter().collect();
    names.sort();
    for name in names {
        let Some(migration) = store.get(name) else {
            return Err(MigrateError::UnknownApplied(name.clone()));
        };
        for dependency in &migration.depends_on {
            if !applied.contains(dependency) {
                return Err(MigrateError::UnappliedDependency {
                    name: name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    Ok(())
}
