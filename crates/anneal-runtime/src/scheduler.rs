//! Topological scheduling of pending migrations.
//!
//! Kahn's algorithm over the dependency graph, pruned by an externally
//! supplied applied-set: only the not-yet-applied subgraph reachable from the
//! target is discovered, so re-runs execute exactly the delta.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::store::{Migration, MigrationStore};

/// Apply every not-yet-applied dependency of `target`, then `target` itself,
/// invoking `apply` once per migration in dependency order.
///
/// Migrations named in `applied` are skipped and never block their
/// dependents. When several migrations are ready at once they run in name
/// order, so a given store and applied-set always produce the same sequence.
///
/// An error from `apply` stops the run immediately; migrations already
/// applied by earlier calls stay applied.
///
/// Panics when nodes remain blocked after the ready queue drains. Cycle
/// validation makes that state unreachable, so hitting it means validation
/// was skipped or is broken, not that the operator did anything wrong.
pub fn run_migration<F>(
    store: &MigrationStore,
    target: &str,
    applied: &HashSet<String>,
    mut apply: F,
) -> Result<()>
where
    F: FnMut(&Migration) -> Result<()>,
{
    if store.get(target).is_none() {
        return Err(MigrateError::UnknownTarget(target.to_string()));
    }
    if applied.contains(target) {
        debug!("target migration {} is already applied", target);
        return Ok(());
    }

    // Discover the pending subgraph: per-node count of unapplied
    // dependencies, plus the reverse edges used to unblock dependents.
    let mut blocked: HashMap<String, usize> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut stack = vec![target.to_string()];
    blocked.insert(target.to_string(), 0);
    while let Some(name) = stack.pop() {
        let migration = store
            .get(&name)
            .expect("discovered names are registered");
        for dependency in &migration.depends_on {
            if applied.contains(dependency) {
                continue;
            }
            if store.get(dependency).is_none() {
                return Err(MigrateError::UnknownDependency {
                    name: name.clone(),
                    dependency: dependency.clone(),
                });
            }
            *blocked.get_mut(&name).expect("node was inserted before its edges") += 1;
            dependents
                .entry(dependency.clone())
                .or_default()
                .push(name.clone());
            if !blocked.contains_key(dependency) {
                blocked.insert(dependency.clone(), 0);
                stack.push(dependency.clone());
            }
        }
    }

    let pending = blocked.len();
    debug!("{} pending migration(s) for target {}", pending, target);

    // Drain: apply every ready node, unblocking its dependents as it goes.
    let mut ready: BTreeSet<String> = blocked
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| name.clone())
        .collect();
    let mut remaining = pending;
    while let Some(name) = ready.pop_first() {
        let migration = store.get(&name).expect("ready names are registered");
        apply(migration)?;
        remaining -= 1;
        if let Some(unblocked) = dependents.get(&name) {
            for dependent in unblocked {
                let count = blocked
                    .get_mut(dependent)
                    .expect("dependents were discovered");
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent.clone());
                }
            }
        }
    }

    if remaining != 0 {
        panic!(
            "{} migration(s) still blocked after scheduling drain; \
             dependency validation was skipped or is broken",
            remaining
        );
    }
    Ok(())
}

/// The names `run_migration` would apply for this target, in order, without
/// applying anything.
pub fn execution_plan(
    store: &MigrationStore,
    target: &str,
    applied: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut plan = Vec::new();
    run_migration(store, target, applied, |migration| {
        plan.push(migration.name.clone());
        Ok(())
    })?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Migration;

    fn store_of(specs: &[(&str, &[&str])]) -> MigrationStore {
        let mut store = MigrationStore::new();
        for (name, deps) in specs {
            let mut migration = Migration::new(*name);
            for dep in *deps {
                migration = migration.with_dependency(*dep);
            }
            store.register(migration);
        }
        store
    }

    fn applied_of(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_dependencies_run_before_target() {
        let store = store_of(&[("a", &["b", "c"]), ("b", &[]), ("c", &[])]);
        let plan = execution_plan(&store, "a", &HashSet::new()).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.last().unwrap(), "a");
        assert!(plan.contains(&"b".to_string()));
        assert!(plan.contains(&"c".to_string()));
    }

    #[test]
    fn test_applied_migrations_are_skipped() {
        let store = store_of(&[("a", &["b", "c"]), ("b", &[]), ("c", &[])]);
        let plan = execution_plan(&store, "a", &applied_of(&["b"])).unwrap();
        assert_eq!(plan, vec!["c", "a"]);
    }

    #[test]
    fn test_applied_target_is_a_no_op() {
        let store = store_of(&[("a", &["b"]), ("b", &[])]);
        let plan = execution_plan(&store, "a", &applied_of(&["a", "b"])).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_diamond_runs_each_node_once() {
        let store = store_of(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let plan = execution_plan(&store, "top", &HashSet::new()).unwrap();

        assert_eq!(plan, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_plan_covers_only_the_target_chain() {
        let store = store_of(&[("m1", &[]), ("m2", &["m1"]), ("other", &[])]);
        let plan = execution_plan(&store, "m2", &HashSet::new()).unwrap();
        assert_eq!(plan, vec!["m1", "m2"]);
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let store = store_of(&[("a", &[])]);
        assert!(matches!(
            execution_plan(&store, "ghost", &HashSet::new()),
            Err(MigrateError::UnknownTarget(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_apply_failure_stops_the_run() {
        let store = store_of(&[("a", &["b"]), ("b", &[])]);
        let mut seen = Vec::new();
        let result = run_migration(&store, "a", &HashSet::new(), |m| {
            seen.push(m.name.clone());
            Err(MigrateError::Database("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(seen, vec!["b"]);
    }
}
