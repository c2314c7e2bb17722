//! Error Types
//!
//! Every layer of the core reports failures through its own error enum:
//!
//! - [`VarError`]: composing or compiling a [`Var`](crate::var::Var). These
//!   are raised eagerly, while component code builds its expressions.
//! - [`EvalError`]: evaluating a Var against live state (computed fields).
//! - [`StateError`]: schema registration and state tree access.
//! - [`FlushError`]: a flush that delivered only part of its delta.
//! - [`HandlerError`]: failures raised by application event handlers.
//! - [`DispatchError`]: routing an inbound event to a session and handler.
//! - [`ConfigError`] / [`ProtocolError`]: configuration loading and wire codecs.
//!
//! Compile-time errors (`VarError`, schema errors) abort the affected build
//! step. Runtime errors are isolated to the session that triggered them.

use thiserror::Error;

use crate::delta::Delta;
use crate::var::{FieldKey, VarType};

/// Errors raised while composing or compiling Vars.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VarError {
    /// An operator was applied to operand types it does not support.
    #[error("type mismatch: cannot apply `{op}` to {}", describe_operands(.left, .right))]
    TypeMismatch {
        op: String,
        left: VarType,
        right: Option<VarType>,
    },

    /// An attribute was read from an object shape that does not declare it.
    #[error("type `{ty}` has no attribute `{attribute}`")]
    NoSuchAttribute { ty: VarType, attribute: String },

    /// A call named a builtin that does not exist.
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    /// A call passed the wrong number of arguments.
    #[error("function `{name}` expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// An annotation tried to change an already concrete type.
    #[error("cannot annotate a var of type `{from}` as `{to}`")]
    InvalidAnnotation { from: VarType, to: VarType },

    /// The compile step needed a concrete type but the Var is still `Unknown`.
    #[error("var `{expression}` has unresolved type `{ty}`; annotate it with a concrete type")]
    UnresolvedType { expression: String, ty: VarType },

    /// The Var still contains container-relative field references.
    #[error("var references `{field}` relative to its container; rebase it before compiling")]
    RelativeReference { field: String },
}

fn describe_operands(left: &VarType, right: &Option<VarType>) -> String {
    match right {
        Some(right) => format!("`{left}` and `{right}`"),
        None => format!("`{left}`"),
    }
}

/// Errors raised while evaluating a Var against state values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in `{op}`")]
    Overflow { op: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("missing key `{key}`")]
    MissingKey { key: String },

    #[error("`{op}` cannot be applied to a {found} value")]
    InvalidOperand { op: String, found: String },

    #[error("function `{name}` only exists on the client and cannot be evaluated on the server")]
    RenderOnlyFunction { name: String },

    #[error("unknown field `{field}`")]
    UnknownField { field: FieldKey },

    /// Integer powers stay integers, so the exponent must not be negative.
    #[error("negative exponent {exponent} in integer power")]
    NegativeExponent { exponent: i64 },

    #[error("`{op}` would produce more than {limit} elements")]
    SizeLimit { op: String, limit: usize },
}

/// Errors raised by schema registration and state tree access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// A name was declared twice within one container.
    #[error("container `{container}` already declares `{name}`")]
    SchemaConflict { container: String, name: String },

    /// A computed field references a field that exists nowhere in the tree.
    #[error("computed field `{computed}` references unknown field `{reference}`")]
    UnknownFieldReference {
        computed: FieldKey,
        reference: FieldKey,
    },

    /// A computed field reads a field as a type other than the one it is
    /// declared with.
    #[error("computed field `{computed}` reads `{reference}` as `{referenced}`, but it is declared as `{declared}`")]
    ReferenceTypeMismatch {
        computed: FieldKey,
        reference: FieldKey,
        referenced: VarType,
        declared: VarType,
    },

    /// Computed fields depend on each other in a loop.
    #[error("cyclic computed dependency: {}", describe_cycle(.cycle))]
    CyclicComputedDependency { cycle: Vec<FieldKey> },

    /// Container, field and handler names must be identifiers.
    #[error("`{name}` is not a valid identifier")]
    InvalidName { name: String },

    #[error("unknown state container `{path}`")]
    UnknownContainer { path: String },

    #[error("unknown field `{field}`")]
    UnknownField { field: FieldKey },

    #[error("computed field `{field}` cannot be assigned")]
    ComputedFieldWrite { field: FieldKey },

    #[error("field `{container}.{field}` expects `{expected}`, got a {found} value")]
    FieldTypeMismatch {
        container: String,
        field: String,
        expected: VarType,
        found: String,
    },

    #[error("failed to evaluate computed field `{field}`: {source}")]
    Eval {
        field: FieldKey,
        #[source]
        source: EvalError,
    },

    #[error("a schema registry is already installed")]
    AlreadyInstalled,
}

fn describe_cycle(cycle: &[FieldKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A flush that could not evaluate every computed field.
///
/// `delta` still carries every stored field and every computed field that
/// did evaluate, and the tree treats those as delivered. Fields that failed
/// are retried on the next flush.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct FlushError {
    pub delta: Delta,
    #[source]
    pub error: StateError,
}

/// Failure raised by an application event handler.
///
/// State accessor errors convert automatically so handler bodies can use `?`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("{message}")]
    Failed { message: String },
}

impl HandlerError {
    /// Create an application-level failure with a message for the client.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors raised while routing an inbound event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("no handler registered at `{path}`")]
    HandlerNotFound { path: String },

    #[error("no connected session `{session_id}`")]
    SessionNotFound { session_id: String },

    #[error("event chain exceeded {limit} events")]
    EventChainLimit { limit: usize },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Errors raised while loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

/// Errors raised by the wire codecs.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}
