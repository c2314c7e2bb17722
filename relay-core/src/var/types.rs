//! Semantic Types
//!
//! Every Var and every state field carries a [`VarType`]. Types are explicit
//! and inferred eagerly when Vars are composed, never at render time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Semantic type tag of a Var or state field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum VarType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    /// Ordered sequence with a single element type.
    Sequence(Box<VarType>),
    /// String-keyed mapping with a single value type.
    Mapping(Box<VarType>),
    /// Either null or the inner type.
    Optional(Box<VarType>),
    /// Record with statically known attributes.
    Object(BTreeMap<String, VarType>),
    /// Not statically known. Must be annotated before a concrete type is required.
    Unknown,
}

impl VarType {
    pub fn sequence(element: VarType) -> Self {
        VarType::Sequence(Box::new(element))
    }

    pub fn mapping(value: VarType) -> Self {
        VarType::Mapping(Box::new(value))
    }

    /// Wrap in `Optional`, without nesting optionals or wrapping `Null`.
    pub fn optional(inner: VarType) -> Self {
        match inner {
            VarType::Optional(_) | VarType::Null | VarType::Unknown => inner,
            other => VarType::Optional(Box::new(other)),
        }
    }

    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, VarType)>,
        K: Into<String>,
    {
        VarType::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, VarType::Int | VarType::Float)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, VarType::Unknown)
    }

    /// True when no `Unknown` appears anywhere in the type.
    pub fn is_concrete(&self) -> bool {
        match self {
            VarType::Unknown => false,
            VarType::Sequence(inner) | VarType::Mapping(inner) | VarType::Optional(inner) => {
                inner.is_concrete()
            }
            VarType::Object(attributes) => attributes.values().all(VarType::is_concrete),
            _ => true,
        }
    }

    /// Whether `self` is the same as `other` with some `Unknown` parts filled in.
    pub fn refines(&self, other: &VarType) -> bool {
        match (self, other) {
            (_, VarType::Unknown) => true,
            (VarType::Sequence(a), VarType::Sequence(b))
            | (VarType::Mapping(a), VarType::Mapping(b))
            | (VarType::Optional(a), VarType::Optional(b)) => a.refines(b),
            (VarType::Object(a), VarType::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(name, ty)| b.get(name).is_some_and(|other| ty.refines(other)))
            }
            (a, b) => a == b,
        }
    }

    /// Check a value against this type, returning the value to store.
    ///
    /// Integers stored into float fields are converted to floats so the
    /// field keeps a single encoding. Everything else must match exactly.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (VarType::Unknown, value) => Some(value),
            (VarType::Null, Value::Null) => Some(Value::Null),
            (VarType::Bool, value @ Value::Bool(_)) => Some(value),
            (VarType::Int, value @ Value::Int(_)) => Some(value),
            (VarType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (VarType::Float, value @ Value::Float(_)) => Some(value),
            (VarType::Str, value @ Value::Str(_)) => Some(value),
            (VarType::Optional(_), Value::Null) => Some(Value::Null),
            (VarType::Optional(inner), value) => inner.coerce(value),
            (VarType::Sequence(element), Value::List(items)) => items
                .into_iter()
                .map(|item| element.coerce(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            (VarType::Mapping(element), Value::Map(map)) => map
                .into_iter()
                .map(|(key, item)| element.coerce(item).map(|item| (key, item)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Value::Map),
            (VarType::Object(attributes), Value::Map(map)) => {
                if map.len() != attributes.len() {
                    return None;
                }
                map.into_iter()
                    .map(|(key, item)| {
                        let ty = attributes.get(&key)?;
                        ty.coerce(item).map(|item| (key, item))
                    })
                    .collect::<Option<BTreeMap<_, _>>>()
                    .map(Value::Map)
            }
            _ => None,
        }
    }

    /// The zero value used when a field is declared without a default.
    pub fn zero_value(&self) -> Value {
        match self {
            VarType::Null | VarType::Optional(_) | VarType::Unknown => Value::Null,
            VarType::Bool => Value::Bool(false),
            VarType::Int => Value::Int(0),
            VarType::Float => Value::Float(0.0),
            VarType::Str => Value::Str(String::new()),
            VarType::Sequence(_) => Value::List(Vec::new()),
            VarType::Mapping(_) => Value::Map(BTreeMap::new()),
            VarType::Object(attributes) => Value::Map(
                attributes
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.zero_value()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Null => f.write_str("null"),
            VarType::Bool => f.write_str("bool"),
            VarType::Int => f.write_str("int"),
            VarType::Float => f.write_str("float"),
            VarType::Str => f.write_str("str"),
            VarType::Sequence(element) => write!(f, "list[{element}]"),
            VarType::Mapping(value) => write!(f, "dict[str, {value}]"),
            VarType::Optional(inner) => write!(f, "{inner} | null"),
            VarType::Object(attributes) => {
                f.write_str("{")?;
                for (i, (name, ty)) in attributes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            VarType::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_readable() {
        assert_eq!(VarType::sequence(VarType::Int).to_string(), "list[int]");
        assert_eq!(
            VarType::optional(VarType::Str).to_string(),
            "str | null"
        );
        let shape = VarType::object([("age", VarType::Int), ("name", VarType::Str)]);
        assert_eq!(shape.to_string(), "{age: int, name: str}");
    }

    #[test]
    fn optional_does_not_nest() {
        let once = VarType::optional(VarType::Int);
        assert_eq!(VarType::optional(once.clone()), once);
        assert_eq!(VarType::optional(VarType::Null), VarType::Null);
    }

    #[test]
    fn coerce_checks_structure() {
        let ty = VarType::sequence(VarType::Float);
        let coerced = ty.coerce(Value::from(vec![1, 2])).unwrap();
        assert_eq!(coerced, Value::List(vec![Value::Float(1.0), Value::Float(2.0)]));

        assert!(VarType::Int.coerce(Value::from("nope")).is_none());
        assert!(VarType::Int.coerce(Value::Float(1.0)).is_none());
        assert_eq!(
            VarType::optional(VarType::Int).coerce(Value::Null),
            Some(Value::Null)
        );
    }

    #[test]
    fn refinement_fills_unknowns_only() {
        let loose = VarType::sequence(VarType::Unknown);
        assert!(VarType::sequence(VarType::Int).refines(&loose));
        assert!(!VarType::mapping(VarType::Int).refines(&loose));
        assert!(!VarType::Int.refines(&VarType::Float));
        assert!(VarType::Str.refines(&VarType::Unknown));
    }

    #[test]
    fn concreteness() {
        assert!(VarType::mapping(VarType::Int).is_concrete());
        assert!(!VarType::mapping(VarType::Unknown).is_concrete());
    }
}
