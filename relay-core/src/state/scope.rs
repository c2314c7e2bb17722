//! Handler Scopes
//!
//! Event handlers receive a [`StateScope`]: a mutable view of the session's
//! tree positioned at the container that owns the handler. Fields are
//! addressed by name relative to that container; other containers are
//! reached by moving to a child, the parent, or an absolute path.

use crate::error::StateError;
use crate::event::Event;
use crate::value::Value;
use crate::var::FieldKey;

use super::tree::StateTree;

/// A session tree positioned at one container.
pub struct StateScope<'t> {
    tree: &'t mut StateTree,
    path: String,
}

impl<'t> StateScope<'t> {
    pub(crate) fn new(tree: &'t mut StateTree, path: String) -> Self {
        Self { tree, path }
    }

    /// Path of the container this scope points at.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn key(&self, name: &str) -> FieldKey {
        FieldKey::new(self.path.as_str(), name)
    }

    /// Read a stored or computed field of this container.
    pub fn get(&mut self, name: &str) -> Result<Value, StateError> {
        let key = self.key(name);
        self.tree.get(&key)
    }

    /// Assign a stored field of this container. The field is dirty as soon as
    /// this returns.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let key = self.key(name);
        self.tree.set(&key, value)
    }

    /// Read-modify-write a stored field of this container.
    pub fn modify<F>(&mut self, name: &str, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Value),
    {
        let key = self.key(name);
        self.tree.modify(&key, f)
    }

    /// Scope of the named child container.
    pub fn child(&mut self, name: &str) -> Result<StateScope<'_>, StateError> {
        let path = format!("{}.{}", self.path, name);
        self.tree.scope(&path)
    }

    /// Scope of the parent container. `None` at the root.
    pub fn parent(&mut self) -> Option<StateScope<'_>> {
        let parent = self.tree.container(&self.path).ok()?.parent()?.to_string();
        Some(StateScope::new(&mut *self.tree, parent))
    }

    /// Scope of any container, by absolute path.
    pub fn state(&mut self, path: &str) -> Result<StateScope<'_>, StateError> {
        self.tree.scope(path)
    }

    /// A follow-up event for a handler of this container.
    pub fn event(&self, handler: &str, args: Vec<Value>) -> Event {
        Event::new(format!("{}.{}", self.path, handler), args)
    }

    /// The whole session tree.
    pub fn tree(&mut self) -> &mut StateTree {
        &mut *self.tree
    }
}
