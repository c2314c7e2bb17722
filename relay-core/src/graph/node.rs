//! Graph Nodes
//!
//! This module defines the node types that live in the field dependency graph.

use std::collections::BTreeSet;

use crate::var::FieldKey;

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain stored field. These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A computed field. It has dependencies and may have dependents.
    Computed,
}

/// A node in the dependency graph, one per state field.
#[derive(Debug, Clone)]
pub struct Node {
    key: FieldKey,
    kind: NodeKind,

    /// Fields this node reads (parents in the DAG).
    dependencies: BTreeSet<FieldKey>,

    /// Fields that read this node (children in the DAG).
    dependents: BTreeSet<FieldKey>,
}

impl Node {
    pub fn new(key: FieldKey, kind: NodeKind) -> Self {
        Self {
            key,
            kind,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    /// Create a node for a stored field.
    pub fn source(key: FieldKey) -> Self {
        Self::new(key, NodeKind::Source)
    }

    /// Create a node for a computed field.
    pub fn computed(key: FieldKey) -> Self {
        Self::new(key, NodeKind::Computed)
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_computed(&self) -> bool {
        self.kind == NodeKind::Computed
    }

    /// Add a dependency (a field that this node reads from).
    pub fn add_dependency(&mut self, key: FieldKey) {
        self.dependencies.insert(key);
    }

    pub fn dependencies(&self) -> &BTreeSet<FieldKey> {
        &self.dependencies
    }

    /// Add a dependent (a field that reads from this node).
    pub fn add_dependent(&mut self, key: FieldKey) {
        self.dependents.insert(key);
    }

    pub fn dependents(&self) -> &BTreeSet<FieldKey> {
        &self.dependents
    }
}
