//! Dependency Graph
//!
//! This module implements the field dependency graph that tracks
//! relationships between stored fields and computed fields.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent state fields, stored or computed
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! The edges come from the dependency sets of the Vars that define computed
//! fields. When fields change, we traverse the graph to find every affected
//! computed field and recompute them in topological order.
//!
//! # Design Decisions
//!
//! 1. One graph per compiled app schema, shared read-only by every session.
//!    Sessions keep their own cached values, never their own graph.
//!
//! 2. Nodes are keyed by [`FieldKey`](crate::var::FieldKey) in ordered maps,
//!    so traversal order (and therefore patch order) is deterministic.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{Node, NodeKind};
pub use scheduler::UpdateScheduler;
