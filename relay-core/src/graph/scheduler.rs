//! Update Scheduler
//!
//! The scheduler determines the order in which computed fields are
//! recomputed. It ensures that dependencies are always updated before their
//! dependents.
//!
//! # Algorithm
//!
//! 1. When fields change, walk their dependents breadth first to collect every
//!    computed field that may be affected.
//! 2. Sort them topologically (dependencies before dependents) with Kahn's
//!    algorithm.
//!
//! The full topological order is computed once when the app schema is
//! compiled. If it cannot be completed, the leftover nodes contain a cycle,
//! which is reported as a path.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::var::FieldKey;

use super::node::Node;

/// The update scheduler owns the dependency graph of one app schema.
#[derive(Debug, Clone, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, keyed by field.
    nodes: BTreeMap<FieldKey, Node>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph. An existing node with the same key is kept.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.key().clone()).or_insert(node);
    }

    pub fn get_node(&self, key: &FieldKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// This means when `dependency` changes, `dependent` may need to update.
    pub fn add_edge(&mut self, dependency: &FieldKey, dependent: &FieldKey) {
        if let Some(dep_node) = self.nodes.get_mut(dependency) {
            dep_node.add_dependent(dependent.clone());
        }
        if let Some(dependent_node) = self.nodes.get_mut(dependent) {
            dependent_node.add_dependency(dependency.clone());
        }
    }

    /// Collect every computed field transitively affected by `changed`.
    ///
    /// Returns the fields in topological order. The changed fields themselves
    /// are only included when another changed field feeds them.
    pub fn mark_changed<'a, I>(&self, changed: I) -> Vec<FieldKey>
    where
        I: IntoIterator<Item = &'a FieldKey>,
    {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the changed fields' direct dependents
        for key in changed {
            if let Some(node) = self.nodes.get(key) {
                queue.extend(node.dependents().iter().cloned());
            }
        }

        // BFS through dependents
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&key) {
                affected.push(key);
                queue.extend(node.dependents().iter().cloned());
            }
        }

        self.topological_sort(&affected).0
    }

    /// Topological order of all computed fields.
    ///
    /// Fails with one dependency cycle, as a path that starts and ends on the
    /// same field.
    pub fn topological_order(&self) -> Result<Vec<FieldKey>, Vec<FieldKey>> {
        let computed: Vec<FieldKey> = self
            .nodes
            .values()
            .filter(|node| node.is_computed())
            .map(|node| node.key().clone())
            .collect();

        let (order, leftover) = self.topological_sort(&computed);
        if leftover.is_empty() {
            Ok(order)
        } else {
            Err(self.find_cycle(&leftover))
        }
    }

    /// Kahn's algorithm restricted to `keys`.
    ///
    /// Returns the sorted prefix and the keys that could not be placed.
    fn topological_sort(&self, keys: &[FieldKey]) -> (Vec<FieldKey>, BTreeSet<FieldKey>) {
        let key_set: BTreeSet<&FieldKey> = keys.iter().collect();
        let mut in_degree: BTreeMap<&FieldKey, usize> = BTreeMap::new();
        let mut result = Vec::with_capacity(keys.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the key set)
        for key in &key_set {
            let degree = self
                .nodes
                .get(*key)
                .map(|node| {
                    node.dependencies()
                        .iter()
                        .filter(|d| key_set.contains(d))
                        .count()
                })
                .unwrap_or(0);
            in_degree.insert(*key, degree);
            if degree == 0 {
                queue.push_back(*key);
            }
        }

        while let Some(key) = queue.pop_front() {
            result.push(key.clone());

            if let Some(node) = self.nodes.get(key) {
                for dependent in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        let placed: BTreeSet<&FieldKey> = result.iter().collect();
        let leftover = key_set
            .into_iter()
            .filter(|key| !placed.contains(key))
            .cloned()
            .collect();
        (result, leftover)
    }

    /// Follow dependencies inside `leftover` until a field repeats.
    ///
    /// Every leftover node has at least one dependency inside the set, so the
    /// walk always closes a loop.
    fn find_cycle(&self, leftover: &BTreeSet<FieldKey>) -> Vec<FieldKey> {
        let Some(start) = leftover.iter().next() else {
            return Vec::new();
        };

        let mut path: Vec<FieldKey> = Vec::new();
        let mut current = start.clone();
        loop {
            if let Some(pos) = path.iter().position(|key| *key == current) {
                let mut cycle = path.split_off(pos);
                cycle.push(current);
                return cycle;
            }
            path.push(current.clone());

            let next = self
                .nodes
                .get(&current)
                .and_then(|node| node.dependencies().iter().find(|d| leftover.contains(*d)));
            match next {
                Some(next) => current = next.clone(),
                None => return path,
            }
        }
    }

    /// Number of fields in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of computed fields in the graph.
    pub fn computed_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_computed()).count()
    }
}
