//! Vars
//!
//! This module implements the symbolic expression system used to bind UI
//! components to state.
//!
//! # Overview
//!
//! A [`Var`] is a typed, immutable expression:
//!
//! - a literal value,
//! - a reference to a state field (`container path`, `field name`),
//! - an operation over other Vars (arithmetic, comparison, indexing, ...),
//! - or a function call.
//!
//! Every Var carries a [`VarType`] and the set of [`FieldKey`]s it reads. Both
//! are computed when the Var is built. Composing Vars of incompatible types
//! fails immediately with [`VarError::TypeMismatch`](crate::error::VarError).
//!
//! # Uses
//!
//! The same Var is consumed two ways:
//!
//! 1. Rendered to JavaScript source for the component compiler
//!    ([`Var::render`], [`Var::compile`]).
//! 2. Evaluated on the server to produce computed field values
//!    ([`Var::evaluate`]). The dependency set drives invalidation in the
//!    state tree and the delta engine.

mod eval;
mod expr;
mod field;
mod ops;
mod render;
mod types;

pub use eval::{FieldSource, NoFields, MAX_REPEAT_LEN};
pub use expr::{Expr, Operands, Var};
pub use field::{is_identifier, FieldKey, RELATIVE_PATH};
pub use ops::{Builtin, Callee, Op};
pub use render::CompiledVar;
pub use types::VarType;
