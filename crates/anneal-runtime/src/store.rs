use std::collections::{HashMap, HashSet};

use anneal_core::{Operation, Schema};

use crate::error::{MigrateError, Result};
use crate::scheduler;

/// A named migration: an ordered operation list plus the names of the
/// migrations that must be applied before it.
///
/// Migrations are created at startup, registered once, and never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name (e.g. "0002_add_user_email").
    pub name: String,

    /// Operations executed in order when the migration runs.
    pub operations: Vec<Operation>,

    /// Names of migrations this one depends on.
    pub depends_on: Vec<String>,
}

impl Migration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Append an operation.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Declare a dependency on another migration by name.
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

/// Registry of every migration known to this process.
///
/// Built once at startup and passed by reference into the runner; there is no
/// process-wide instance. Registration collisions are programming errors and
/// panic; everything about the shape of the graph is checked by
/// [`validate`](Self::validate) before any migration runs.
#[derive(Debug, Default)]
pub struct MigrationStore {
    migrations: HashMap<String, Migration>,
}

impl MigrationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration.
    ///
    /// Panics when the name is already taken: two migrations with one name is
    /// a startup-time programming error, not a runtime condition.
    pub fn register(&mut self, migration: Migration) {
        if self.migrations.contains_key(&migration.name) {
            panic!("migration {} is already registered", migration.name);
        }
        self.migrations.insert(migration.name.clone(), migration);
    }

    /// Look up a migration by name.
    pub fn get(&self, name: &str) -> Option<&Migration> {
        self.migrations.get(name)
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.migrations.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check the dependency graph: empty names, self-dependencies, unknown
    /// dependencies, and cycles all fail here, before any SQL executes.
    pub fn validate(&self) -> Result<()> {
        for name in self.names() {
            if name.is_empty() {
                return Err(MigrateError::EmptyMigrationName);
            }
            let migration = &self.migrations[&name];
            for dependency in &migration.depends_on {
                if dependency == &name {
                    return Err(MigrateError::SelfDependency(name.clone()));
                }
                if !self.migrations.contains_key(dependency) {
                    return Err(MigrateError::UnknownDependency {
                        name: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        // Three-color depth-first search over the name-keyed adjacency.
        let mut color: HashMap<&str, Color> = HashMap::new();
        for name in self.names() {
            self.visit(&self.migrations[&name].name, &mut color)?;
        }
        Ok(())
    }

    fn visit<'a>(&'a self, name: &'a str, color: &mut HashMap<&'a str, Color>) -> Result<()> {
        match color.get(name) {
            Some(Color::Gray) => return Err(MigrateError::DependencyCycle(name.to_string())),
            Some(Color::Black) => return Ok(()),
            None => {}
        }
        color.insert(name, Color::Gray);
        for dependency in &self.migrations[name].depends_on {
            self.visit(dependency, color)?;
        }
        color.insert(name, Color::Black);
        Ok(())
    }

    /// Names no other migration depends on: the intended end states. A store
    /// with a linear history has exactly one head.
    pub fn heads(&self) -> Vec<String> {
        let depended_on: HashSet<&String> = self
            .migrations
            .values()
            .flat_map(|m| m.depends_on.iter())
            .collect();
        let mut heads: Vec<String> = self
            .migrations
            .keys()
            .filter(|name| !depended_on.contains(*name))
            .cloned()
            .collect();
        heads.sort();
        heads
    }

    /// Rebuild the schema a target migration describes by applying the whole
    /// dependency chain, in order, to an empty schema.
    ///
    /// This is how a migration author checks that the registered history
    /// still reproduces the model the newest migration was written against.
    pub fn replay(&self, target: &str) -> Result<Schema> {
        let plan = scheduler::execution_plan(self, target, &HashSet::new())?;
        let mut schema = Schema::new();
        for name in &plan {
            let migration = &self.migrations[name];
            for operation in &migration.operations {
                operation.apply(&mut schema)?;
            }
        }
        Ok(schema)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Gray,
    Black,
}
