use thiserror::Error;

use anneal_core::SchemaError;

/// Error type for the migration store, scheduler, and runner.
///
/// Graph errors (`SelfDependency` through `NoMigrations`) are detected before
/// any SQL executes and require correcting the registered migrations; they
/// are never recoverable at runtime. Ledger errors mean the database's
/// applied-set could not have been produced by this store.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration has an empty name")]
    EmptyMigrationName,

    #[error("migration {0} depends on itself")]
    SelfDependency(String),

    #[error("migration {name} depends on unknown migration {dependency}")]
    UnknownDependency { name: String, dependency: String },

    #[error("dependency cycle through migration {0}")]
    DependencyCycle(String),

    #[error("unknown target migration {0}")]
    UnknownTarget(String),

    #[error("multiple migration heads {0:?}: history has diverged and must be reconciled by hand")]
    AmbiguousHeads(Vec<String>),

    #[error("no migrations registered")]
    NoMigrations,

    #[error("ledger lists {0}, which is not a registered migration")]
    UnknownApplied(String),

    #[error("ledger lists {name} but not its dependency {dependency}")]
    UnappliedDependency { name: String, dependency: String },
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
