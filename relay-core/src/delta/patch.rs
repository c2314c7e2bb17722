//! Delta Patches
//!
//! A [`Delta`] maps container paths to the fields that changed in them. Both
//! levels are key-ordered, so a delta with the same contents always
//! serializes to the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Changed fields of one container, keyed by field name.
pub type FieldPatch = BTreeMap<String, Value>;

/// Minimal description of state changes: container path → field → value.
///
/// An empty delta means no observable change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(BTreeMap<String, FieldPatch>);

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields in the patch, across all containers.
    pub fn field_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Record the new value of a field, replacing any earlier entry.
    pub fn insert(&mut self, path: impl Into<String>, field: impl Into<String>, value: Value) {
        self.0
            .entry(path.into())
            .or_default()
            .insert(field.into(), value);
    }

    pub fn container(&self, path: &str) -> Option<&FieldPatch> {
        self.0.get(path)
    }

    pub fn get(&self, path: &str, field: &str) -> Option<&Value> {
        self.0.get(path)?.get(field)
    }

    /// Fold a later delta into this one. Later values win.
    pub fn merge(&mut self, other: Delta) {
        for (path, fields) in other.0 {
            self.0.entry(path).or_default().extend(fields);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldPatch)> {
        self.0.iter().map(|(path, fields)| (path.as_str(), fields))
    }

    pub fn into_inner(self) -> BTreeMap<String, FieldPatch> {
        self.0
    }
}

impl From<BTreeMap<String, FieldPatch>> for Delta {
    fn from(patch: BTreeMap<String, FieldPatch>) -> Self {
        Self(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_groups_by_container() {
        let mut delta = Delta::new();
        assert!(delta.is_empty());

        delta.insert("app", "count", Value::Int(1));
        delta.insert("app", "double", Value::Int(2));
        delta.insert("app.child", "name", Value::from("x"));

        assert_eq!(delta.field_count(), 3);
        assert_eq!(delta.container("app").unwrap().len(), 2);
        assert_eq!(delta.get("app.child", "name"), Some(&Value::from("x")));
    }

    #[test]
    fn merge_keeps_latest_value() {
        let mut first = Delta::new();
        first.insert("app", "count", Value::Int(1));
        first.insert("app", "label", Value::from("a"));

        let mut second = Delta::new();
        second.insert("app", "count", Value::Int(2));

        first.merge(second);
        assert_eq!(first.get("app", "count"), Some(&Value::Int(2)));
        assert_eq!(first.get("app", "label"), Some(&Value::from("a")));
    }

    #[test]
    fn serializes_as_nested_map() {
        let mut delta = Delta::new();
        delta.insert("counter", "double", Value::Int(2));
        delta.insert("counter", "count", Value::Int(1));

        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, r#"{"counter":{"count":1,"double":2}}"#);
    }
}
