//! State Containers
//!
//! A [`StateContainer`] is one node of a session's state tree. It owns its
//! stored values, its computed-field cache slots and its children. The parent
//! is only known by path, so there are no reference cycles between nodes.

use indexmap::{IndexMap, IndexSet};

use crate::value::Value;

use super::computed::ComputedSlot;
use super::schema::StateSchema;

/// Runtime instance of a container schema.
#[derive(Debug, Clone)]
pub struct StateContainer {
    path: String,
    parent: Option<String>,
    values: IndexMap<String, Value>,
    computed: IndexMap<String, ComputedSlot>,
    children: IndexMap<String, StateContainer>,
    /// Stored fields assigned since the last flush.
    dirty: IndexSet<String>,
}

impl StateContainer {
    /// Instantiate `schema` (and its children, recursively) at `path`, with
    /// every field at its declared default.
    pub(crate) fn instantiate(schema: &StateSchema, path: String, parent: Option<String>) -> Self {
        let values = schema
            .fields()
            .map(|decl| (decl.name().to_string(), decl.default_value().clone()))
            .collect();
        let computed = schema
            .computed_fields()
            .map(|(name, _)| (name.to_string(), ComputedSlot::new()))
            .collect();
        let children = schema
            .children()
            .map(|(name, child)| {
                let child_path = format!("{path}.{name}");
                let instance = StateContainer::instantiate(child, child_path, Some(path.clone()));
                (name.to_string(), instance)
            })
            .collect();

        Self {
            path,
            parent,
            values,
            computed,
            children,
            dirty: IndexSet::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the parent container. `None` for the root.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Current value of a stored field.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Store a value and mark the field dirty. The caller type-checks.
    pub(crate) fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                self.dirty.insert(name.to_string());
                true
            }
            None => false,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&ComputedSlot> {
        self.computed.get(name)
    }

    pub(crate) fn slot_mut(&mut self, name: &str) -> Option<&mut ComputedSlot> {
        self.computed.get_mut(name)
    }

    pub fn child(&self, name: &str) -> Option<&StateContainer> {
        self.children.get(name)
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut StateContainer> {
        self.children.get_mut(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &StateContainer> {
        self.children.values()
    }

    /// Stored fields assigned since the last flush, in assignment order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// This container followed by all of its descendants, parents first.
    pub fn descendants(&self) -> Vec<&StateContainer> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.children.values());
            i += 1;
        }
        out
    }

    pub(crate) fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut StateContainer)) {
        f(self);
        for child in self.children.values_mut() {
            child.for_each_mut(f);
        }
    }
}
