//! Delta Engine
//!
//! Computes the patch a client needs after a handler ran.
//!
//! # Algorithm
//!
//! 1. Emit the current value of every dirty stored field (backend fields are
//!    skipped but still cascade).
//! 2. Recompute the computed fields that directly depend on the fields that
//!    changed. A recomputed value that differs from the one the client last
//!    received is emitted and becomes the next round's change set. Repeat
//!    until a round changes nothing.
//! 3. Clear every dirty set.
//!
//! Each round moves at least one step further along a dependency chain, so
//! an acyclic graph settles within as many rounds as there are computed
//! fields. Running past that bound means the fields feed each other, and the
//! flush fails with [`StateError::CyclicComputedDependency`].
//!
//! # Evaluation Failures
//!
//! A computed field that fails to evaluate is left out of the delta and
//! stops cascading, but the rest of the flush goes on. The delta is returned
//! inside a [`FlushError`] naming the first failure, in dependency order, and
//! the failed fields are re-evaluated at the start of the next flush.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{FlushError, StateError};
use crate::graph::UpdateScheduler;
use crate::state::{AppSchema, StateTree};
use crate::value::Value;
use crate::var::FieldKey;

use super::patch::Delta;

/// Flush the tree's dirty state into a delta.
pub fn compute_delta(tree: &mut StateTree) -> Result<Delta, FlushError> {
    let schema = Arc::clone(tree.schema());
    let mut delta = Delta::new();
    let mut failures = Vec::new();

    let dirty = tree.dirty_keys();
    for key in &dirty {
        if schema.is_backend(key) {
            continue;
        }
        match tree.get(key) {
            Ok(value) => delta.insert(key.path.as_str(), key.field.as_str(), value),
            Err(error) => failures.push(error),
        }
    }

    let bound = schema.computed_count();
    let mut retry = tree.take_unsent();
    let mut unsent = BTreeSet::new();
    let mut frontier: BTreeSet<FieldKey> = dirty.into_iter().collect();
    let mut rounds = 0;

    loop {
        let affected = affected_fields(&schema, &frontier, &std::mem::take(&mut retry));
        if affected.is_empty() {
            break;
        }
        if rounds == bound {
            let cycle = cycle_path(schema.graph(), affected);
            failures.push(StateError::CyclicComputedDependency { cycle });
            break;
        }
        rounds += 1;

        let mut changed = BTreeSet::new();
        for key in affected {
            match refresh(tree, &key) {
                Ok(Some(value)) => {
                    delta.insert(key.path.as_str(), key.field.as_str(), value);
                    changed.insert(key);
                }
                Ok(None) => {}
                Err(error) => {
                    failures.push(error);
                    unsent.insert(key);
                }
            }
        }
        frontier = changed;
    }

    tree.clear_dirty();
    tree.set_unsent(unsent);

    tracing::debug!(
        containers = delta.iter().count(),
        fields = delta.field_count(),
        rounds,
        failed = failures.len(),
        "computed delta"
    );

    match failures.into_iter().next() {
        Some(error) => Err(FlushError { delta, error }),
        None => Ok(delta),
    }
}

/// Re-evaluate a computed field. Returns the value if the client does not
/// hold it yet.
fn refresh(tree: &mut StateTree, key: &FieldKey) -> Result<Option<Value>, StateError> {
    tree.invalidate(key)?;
    let value = tree.get(key)?;
    Ok(tree.slot_mut(key)?.sync(&value).then_some(value))
}

/// Computed fields that read any of `changed` directly, plus `retry`, in
/// topological order.
fn affected_fields(
    schema: &AppSchema,
    changed: &BTreeSet<FieldKey>,
    retry: &BTreeSet<FieldKey>,
) -> Vec<FieldKey> {
    let graph = schema.graph();
    let dependents: BTreeSet<&FieldKey> = changed
        .iter()
        .filter_map(|key| graph.get_node(key))
        .flat_map(|node| node.dependents())
        .collect();

    schema
        .computed_order()
        .iter()
        .filter(|key| dependents.contains(key) || retry.contains(*key))
        .cloned()
        .collect()
}

/// The dependency cycle that kept `frontier` from settling.
fn cycle_path(graph: &UpdateScheduler, frontier: Vec<FieldKey>) -> Vec<FieldKey> {
    match graph.topological_order() {
        Err(cycle) => cycle,
        Ok(_) => frontier,
    }
}
