//! State Trees
//!
//! A [`StateTree`] is the mutable state of one session: a root
//! [`StateContainer`] instantiated from the shared [`AppSchema`]. Trees never
//! share mutable data, so sessions are isolated by construction.
//!
//! # Reads and Writes
//!
//! - Assigning a stored field type-checks the value, stores it, marks the
//!   field dirty immediately and invalidates every computed field that
//!   transitively depends on it.
//! - Reading a computed field re-evaluates it if it was invalidated.
//! - [`StateTree::flush`] hands the dirty state to the delta engine.
//!   Computed fields that failed to evaluate during a flush are kept aside
//!   and re-evaluated by the next one.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::delta::{compute_delta, Delta};
use crate::error::{EvalError, FlushError, StateError};
use crate::value::Value;
use crate::var::{FieldKey, FieldSource};

use super::computed::ComputedSlot;
use super::container::StateContainer;
use super::registry::AppSchema;
use super::scope::StateScope;

/// The state of one session.
#[derive(Debug, Clone)]
pub struct StateTree {
    schema: Arc<AppSchema>,
    root: StateContainer,
    /// Computed fields whose current value the client has not received.
    unsent: BTreeSet<FieldKey>,
}

impl StateTree {
    /// Instantiate the schema with every field at its default.
    ///
    /// Computed fields are evaluated once so the tree starts in the same
    /// state as [`AppSchema::initial_state`], which is what a freshly
    /// connected client is hydrated with.
    pub fn new(schema: Arc<AppSchema>) -> Result<Self, StateError> {
        let root_path = schema.root_path().to_string();
        let root_schema = schema
            .container(&root_path)
            .map(|info| Arc::clone(info.schema()))
            .ok_or_else(|| StateError::UnknownContainer {
                path: root_path.clone(),
            })?;
        let root = StateContainer::instantiate(&root_schema, root_path, None);

        let mut tree = Self {
            schema,
            root,
            unsent: BTreeSet::new(),
        };
        let order = tree.schema.computed_order().to_vec();
        for key in &order {
            let value = tree.computed_value(key)?;
            tree.slot_mut(key)?.sync(&value);
        }
        Ok(tree)
    }

    pub fn schema(&self) -> &Arc<AppSchema> {
        &self.schema
    }

    pub fn root(&self) -> &StateContainer {
        &self.root
    }

    pub fn container(&self, path: &str) -> Result<&StateContainer, StateError> {
        let root = &self.root;
        let found = if path == root.path() {
            Some(root)
        } else {
            relative_segments(root.path(), path)
                .and_then(|rest| rest.split('.').try_fold(root, |node, name| node.child(name)))
        };
        found.ok_or_else(|| StateError::UnknownContainer {
            path: path.to_string(),
        })
    }

    pub(crate) fn container_mut(&mut self, path: &str) -> Result<&mut StateContainer, StateError> {
        let root_path = self.root.path().to_string();
        let root = &mut self.root;
        let found = if path == root_path {
            Some(root)
        } else {
            relative_segments(&root_path, path).and_then(|rest| {
                rest.split('.')
                    .try_fold(root, |node, name| node.child_mut(name))
            })
        };
        found.ok_or_else(|| StateError::UnknownContainer {
            path: path.to_string(),
        })
    }

    /// Read a stored or computed field.
    pub fn get(&mut self, key: &FieldKey) -> Result<Value, StateError> {
        let container = self.container(&key.path)?;
        if let Some(value) = container.value(&key.field) {
            return Ok(value.clone());
        }
        if container.slot(&key.field).is_some() {
            return self.computed_value(key);
        }
        Err(StateError::UnknownField { field: key.clone() })
    }

    /// Assign a stored field.
    pub fn set(&mut self, key: &FieldKey, value: impl Into<Value>) -> Result<(), StateError> {
        let value = value.into();
        let decl = match self.schema.field(key) {
            Some(decl) => decl,
            None => return Err(self.missing_field(key)),
        };

        let found = value.kind();
        let value = decl
            .var_type()
            .coerce(value)
            .ok_or_else(|| StateError::FieldTypeMismatch {
                container: key.path.clone(),
                field: key.field.clone(),
                expected: decl.var_type().clone(),
                found: found.to_string(),
            })?;

        if !self.container_mut(&key.path)?.assign(&key.field, value) {
            return Err(StateError::UnknownField { field: key.clone() });
        }
        self.invalidate_dependents(key);
        tracing::trace!(field = %key, "assigned field");
        Ok(())
    }

    /// Read-modify-write a stored field. The result is type-checked like
    /// [`StateTree::set`].
    pub fn modify<F>(&mut self, key: &FieldKey, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Value),
    {
        let mut value = self.get(key)?;
        f(&mut value);
        self.set(key, value)
    }

    /// Full current state, computed fields included and backend fields
    /// excluded.
    ///
    /// The client is assumed to hold exactly this state afterwards.
    pub fn snapshot(&mut self) -> Result<Delta, StateError> {
        let schema = Arc::clone(&self.schema);
        let mut delta = Delta::new();
        for info in schema.containers() {
            let path = info.path();
            for decl in info.schema().fields() {
                if decl.is_backend() {
                    continue;
                }
                let value = self.get(&FieldKey::new(path, decl.name()))?;
                delta.insert(path, decl.name(), value);
            }
            for (name, _) in info.schema().computed_fields() {
                let key = FieldKey::new(path, name);
                let value = self.computed_value(&key)?;
                self.slot_mut(&key)?.sync(&value);
                delta.insert(path, name, value);
            }
        }
        self.unsent.clear();
        Ok(delta)
    }

    /// Compute the delta for everything changed since the last flush.
    pub fn flush(&mut self) -> Result<Delta, FlushError> {
        compute_delta(self)
    }

    /// True when any container has unflushed assignments.
    pub fn is_dirty(&self) -> bool {
        self.root.descendants().iter().any(|c| c.is_dirty())
    }

    /// A handle on the container at `path`, for use by event handlers.
    pub fn scope(&mut self, path: &str) -> Result<StateScope<'_>, StateError> {
        self.container(path)?;
        Ok(StateScope::new(self, path.to_string()))
    }

    /// Every dirty stored field, parents first.
    pub(crate) fn dirty_keys(&self) -> Vec<FieldKey> {
        self.root
            .descendants()
            .into_iter()
            .flat_map(|c| c.dirty_fields().map(move |field| FieldKey::new(c.path(), field)))
            .collect()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.root.for_each_mut(&mut |c| c.clear_dirty());
    }

    pub(crate) fn take_unsent(&mut self) -> BTreeSet<FieldKey> {
        std::mem::take(&mut self.unsent)
    }

    pub(crate) fn set_unsent(&mut self, unsent: BTreeSet<FieldKey>) {
        self.unsent = unsent;
    }

    pub(crate) fn slot_mut(&mut self, key: &FieldKey) -> Result<&mut ComputedSlot, StateError> {
        self.container_mut(&key.path)?
            .slot_mut(&key.field)
            .ok_or_else(|| StateError::UnknownField { field: key.clone() })
    }

    /// Drop the cached value of a computed field.
    pub(crate) fn invalidate(&mut self, key: &FieldKey) -> Result<(), StateError> {
        self.slot_mut(key)?.mark_dirty();
        Ok(())
    }

    fn invalidate_dependents(&mut self, key: &FieldKey) {
        let schema = Arc::clone(&self.schema);
        for dependent in schema.graph().mark_changed([key]) {
            if let Ok(slot) = self.slot_mut(&dependent) {
                slot.mark_dirty();
            }
        }
    }

    fn computed_value(&mut self, key: &FieldKey) -> Result<Value, StateError> {
        let slot = self
            .container(&key.path)?
            .slot(&key.field)
            .ok_or_else(|| StateError::UnknownField { field: key.clone() })?;
        if let Some(value) = slot.cached() {
            return Ok(value.clone());
        }

        let schema = Arc::clone(&self.schema);
        let var = schema
            .computed(key)
            .ok_or_else(|| StateError::UnknownField { field: key.clone() })?;
        let value = var
            .evaluate(&mut TreeSource(self))
            .map_err(|source| StateError::Eval {
                field: key.clone(),
                source,
            })?;

        self.slot_mut(key)?.store(value.clone());
        Ok(value)
    }

    fn missing_field(&self, key: &FieldKey) -> StateError {
        if self.schema.container(&key.path).is_none() {
            StateError::UnknownContainer {
                path: key.path.clone(),
            }
        } else if self.schema.is_computed(key) {
            StateError::ComputedFieldWrite { field: key.clone() }
        } else {
            StateError::UnknownField { field: key.clone() }
        }
    }
}

/// Strip the root path and the following dot from `path`.
fn relative_segments<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(root)?.strip_prefix('.')
}

/// Evaluates computed Vars against the tree, recomputing stale inputs.
struct TreeSource<'a>(&'a mut StateTree);

impl FieldSource for TreeSource<'_> {
    fn field_value(&mut self, key: &FieldKey) -> Result<Value, EvalError> {
        self.0.get(key).map_err(|err| match err {
            StateError::Eval { source, .. } => source,
            _ => EvalError::UnknownField { field: key.clone() },
        })
    }
}
