//! Field Keys
//!
//! A [`FieldKey`] addresses one field of one state container: the dotted
//! container path plus the field name. Dependency sets, dirty sets and the
//! computed-field graph are all keyed by it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path of a field relative to its own container. Rebased to an absolute
/// container path when the container is placed in a tree.
pub const RELATIVE_PATH: &str = "";

/// Address of a state field: `(container path, field name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub path: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
        }
    }

    /// Key of a field in the same container as the referencing expression.
    pub fn relative(field: impl Into<String>) -> Self {
        Self::new(RELATIVE_PATH, field)
    }

    pub fn is_relative(&self) -> bool {
        self.path == RELATIVE_PATH
    }

    /// Resolve a relative key against a container path. Absolute keys are
    /// returned unchanged.
    pub fn rebased(&self, base: &str) -> Self {
        if self.is_relative() {
            Self::new(base, self.field.clone())
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_relative() {
            write!(f, "self.{}", self.field)
        } else {
            write!(f, "{}.{}", self.path, self.field)
        }
    }
}

/// Check that a container, field or handler name is a plain identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
