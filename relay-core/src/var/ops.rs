//! Operators and Type Rules
//!
//! Defines the operation codes a Var expression can contain and the fixed
//! per-operator table that infers the result type from the operand types.
//! Unsupported combinations fail with [`VarError::TypeMismatch`] at
//! composition time.

use std::fmt;

use crate::error::VarError;
use crate::value::Value;

use super::expr::{Expr, Var};
use super::types::VarType;

/// Operation codes of composed Vars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Neg,

    // Comparison
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    // Logic
    And,
    Or,
    Not,

    // Collections
    Contains,
    Index,
    Attr,
    Length,

    // Other
    Stringify,
    Cond,
    Annotate(VarType),
}

impl Op {
    /// Number of operands the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Neg | Op::Not | Op::Length | Op::Stringify | Op::Annotate(_) => 1,
            Op::Cond => 3,
            _ => 2,
        }
    }

    /// Short symbol used in error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::FloorDiv => "//",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::Neg => "neg",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Contains => "contains",
            Op::Index => "[]",
            Op::Attr => ".",
            Op::Length => "length",
            Op::Stringify => "str",
            Op::Cond => "cond",
            Op::Annotate(_) => "annotate",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Functions known to both the renderer and the server-side evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Abs,
    Round,
    Min,
    Max,
    Upper,
    Lower,
    Trim,
    Join,
    Split,
    Keys,
    Values,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Builtin::Abs,
            "round" => Builtin::Round,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "upper" => Builtin::Upper,
            "lower" => Builtin::Lower,
            "trim" => Builtin::Trim,
            "join" => Builtin::Join,
            "split" => Builtin::Split,
            "keys" => Builtin::Keys,
            "values" => Builtin::Values,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Trim => "trim",
            Builtin::Join => "join",
            Builtin::Split => "split",
            Builtin::Keys => "keys",
            Builtin::Values => "values",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Min | Builtin::Max | Builtin::Join | Builtin::Split => 2,
            _ => 1,
        }
    }
}

/// Target of a [`Expr::Call`].
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Builtin(Builtin),
    /// A client-side function declared by component code. Render-only.
    External { name: String, returns: VarType },
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Builtin(builtin) => builtin.name(),
            Callee::External { name, .. } => name,
        }
    }
}

fn mismatch(op: impl fmt::Display, left: &VarType, right: Option<&VarType>) -> VarError {
    VarError::TypeMismatch {
        op: op.to_string(),
        left: left.clone(),
        right: right.cloned(),
    }
}

/// Infer the result type of an operation over the given operands.
pub(crate) fn infer_operation(op: &Op, operands: &[Var]) -> Result<VarType, VarError> {
    use VarType::*;

    let ty = |i: usize| operands[i].var_type();

    match op {
        Op::Add => {
            let (l, r) = (ty(0), ty(1));
            match (l, r) {
                (Str, Str) => Ok(Str),
                (Sequence(a), Sequence(b)) => unify_elements(a, b)
                    .map(VarType::sequence)
                    .ok_or_else(|| mismatch(op, l, Some(r))),
                _ => arithmetic(op, l, r),
            }
        }
        Op::Mul => {
            let (l, r) = (ty(0), ty(1));
            match (l, r) {
                (Str, Int) | (Int, Str) => Ok(Str),
                (Sequence(element), Int) | (Int, Sequence(element)) => {
                    Ok(VarType::sequence((**element).clone()))
                }
                _ => arithmetic(op, l, r),
            }
        }
        Op::Sub | Op::Div | Op::FloorDiv | Op::Mod | Op::Pow => arithmetic(op, ty(0), ty(1)),
        Op::Neg => match ty(0) {
            Int => Ok(Int),
            Float => Ok(Float),
            Unknown => Ok(Unknown),
            other => Err(mismatch(op, other, None)),
        },
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let (l, r) = (ty(0), ty(1));
            let ordered = (l.is_numeric() && r.is_numeric())
                || (*l == Str && *r == Str)
                || l.is_unknown()
                || r.is_unknown();
            if ordered {
                Ok(Bool)
            } else {
                Err(mismatch(op, l, Some(r)))
            }
        }
        Op::Eq | Op::Ne => {
            let (l, r) = (ty(0), ty(1));
            if comparable(l, r) {
                Ok(Bool)
            } else {
                Err(mismatch(op, l, Some(r)))
            }
        }
        Op::And | Op::Or => {
            let (l, r) = (ty(0), ty(1));
            match (l, r) {
                (a, b) if a == b => Ok(a.clone()),
                (Optional(inner), other) if *op == Op::Or && **inner == *other => {
                    Ok(other.clone())
                }
                (Unknown, _) | (_, Unknown) => Ok(Unknown),
                _ => Err(mismatch(op, l, Some(r))),
            }
        }
        Op::Not => Ok(Bool),
        Op::Contains => {
            let (container, element) = (ty(0), ty(1));
            let valid = match (container, element) {
                (Unknown, _) => true,
                (Sequence(inner), element) => comparable(inner, element),
                (Str, Str | Unknown) => true,
                (Mapping(_) | Object(_), Str | Unknown) => true,
                _ => false,
            };
            if valid {
                Ok(Bool)
            } else {
                Err(mismatch(op, container, Some(element)))
            }
        }
        Op::Index => index_type(op, ty(0), &operands[1]),
        Op::Attr => {
            let name = match operands[1].expression() {
                Expr::Literal(Value::Str(name)) => name.as_str(),
                _ => return Err(mismatch(op, ty(0), Some(ty(1)))),
            };
            attr_type(ty(0), name)
        }
        Op::Length => match ty(0) {
            Str | Sequence(_) | Mapping(_) | Object(_) | Unknown => Ok(Int),
            other => Err(mismatch(op, other, None)),
        },
        Op::Stringify => Ok(Str),
        Op::Cond => {
            let (a, b) = (ty(1), ty(2));
            match (a, b) {
                (a, b) if a == b => Ok(a.clone()),
                (Unknown, _) | (_, Unknown) => Ok(Unknown),
                (Null, other) | (other, Null) => Ok(VarType::optional(other.clone())),
                (Optional(inner), other) | (other, Optional(inner)) if **inner == *other => {
                    Ok(VarType::optional(other.clone()))
                }
                _ => Err(mismatch(op, a, Some(b))),
            }
        }
        Op::Annotate(target) => {
            let current = ty(0);
            if target.refines(current) {
                Ok(target.clone())
            } else {
                Err(VarError::InvalidAnnotation {
                    from: current.clone(),
                    to: target.clone(),
                })
            }
        }
    }
}

/// Infer the return type of a call.
pub(crate) fn infer_call(callee: &Callee, args: &[Var]) -> Result<VarType, VarError> {
    use VarType::*;

    let builtin = match callee {
        Callee::External { returns, .. } => return Ok(returns.clone()),
        Callee::Builtin(builtin) => *builtin,
    };

    if args.len() != builtin.arity() {
        return Err(VarError::ArityMismatch {
            name: builtin.name().to_string(),
            expected: builtin.arity(),
            found: args.len(),
        });
    }

    let name = builtin.name();
    let ty = |i: usize| args[i].var_type();
    let string_like = |t: &VarType| matches!(t, Str | Unknown);

    match builtin {
        Builtin::Abs => match ty(0) {
            Int => Ok(Int),
            Float => Ok(Float),
            Unknown => Ok(Unknown),
            other => Err(mismatch(name, other, None)),
        },
        Builtin::Round => match ty(0) {
            Int | Float | Unknown => Ok(Int),
            other => Err(mismatch(name, other, None)),
        },
        Builtin::Min | Builtin::Max => arithmetic(name, ty(0), ty(1)),
        Builtin::Upper | Builtin::Lower | Builtin::Trim => {
            if string_like(ty(0)) {
                Ok(Str)
            } else {
                Err(mismatch(name, ty(0), None))
            }
        }
        Builtin::Join => {
            let items_ok = match ty(0) {
                Sequence(element) => string_like(element),
                Unknown => true,
                _ => false,
            };
            if items_ok && string_like(ty(1)) {
                Ok(Str)
            } else {
                Err(mismatch(name, ty(0), Some(ty(1))))
            }
        }
        Builtin::Split => {
            if string_like(ty(0)) && string_like(ty(1)) {
                Ok(VarType::sequence(Str))
            } else {
                Err(mismatch(name, ty(0), Some(ty(1))))
            }
        }
        Builtin::Keys => match ty(0) {
            Mapping(_) | Object(_) | Unknown => Ok(VarType::sequence(Str)),
            other => Err(mismatch(name, other, None)),
        },
        Builtin::Values => match ty(0) {
            Mapping(element) => Ok(VarType::sequence((**element).clone())),
            Object(_) | Unknown => Ok(VarType::sequence(Unknown)),
            other => Err(mismatch(name, other, None)),
        },
    }
}

fn arithmetic(op: impl fmt::Display, l: &VarType, r: &VarType) -> Result<VarType, VarError> {
    use VarType::*;

    let op_name = op.to_string();
    match (l, r) {
        (Unknown, _) | (_, Unknown) => Ok(Unknown),
        (Int, Int) if op_name == Op::Div.symbol() => Ok(Float),
        // `**` with a negative exponent fails at evaluation instead
        (Int, Int) => Ok(Int),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(Float),
        _ => Err(mismatch(op_name, l, Some(r))),
    }
}

fn unify_elements(a: &VarType, b: &VarType) -> Option<VarType> {
    match (a, b) {
        (a, b) if a == b => Some(a.clone()),
        (VarType::Unknown, other) | (other, VarType::Unknown) => Some(other.clone()),
        _ => None,
    }
}

fn comparable(a: &VarType, b: &VarType) -> bool {
    use VarType::*;

    match (a, b) {
        (a, b) if a == b => true,
        (Unknown, _) | (_, Unknown) | (Null, _) | (_, Null) => true,
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (Optional(inner), other) | (other, Optional(inner)) => comparable(inner, other),
        (Sequence(a), Sequence(b)) | (Mapping(a), Mapping(b)) => comparable(a, b),
        _ => false,
    }
}

fn index_type(op: &Op, container: &VarType, index: &Var) -> Result<VarType, VarError> {
    use VarType::*;

    match (container, index.var_type()) {
        (Optional(inner), _) => index_type(op, inner, index).map(VarType::optional),
        (Unknown, Int | Str | Unknown) => Ok(Unknown),
        (Sequence(element), Int | Unknown) => Ok((**element).clone()),
        (Str, Int | Unknown) => Ok(Str),
        (Mapping(element), Str | Unknown) => Ok((**element).clone()),
        (Object(_), Str) => match index.expression() {
            Expr::Literal(Value::Str(name)) => attr_type(container, name),
            _ => Ok(Unknown),
        },
        (Object(_), Unknown) => Ok(Unknown),
        (_, index_ty) => Err(mismatch(op, container, Some(index_ty))),
    }
}

fn attr_type(container: &VarType, name: &str) -> Result<VarType, VarError> {
    match container {
        VarType::Optional(inner) => attr_type(inner, name).map(VarType::optional),
        VarType::Unknown => Ok(VarType::Unknown),
        VarType::Mapping(element) => Ok((**element).clone()),
        VarType::Object(attributes) => {
            attributes
                .get(name)
                .cloned()
                .ok_or_else(|| VarError::NoSuchAttribute {
                    ty: container.clone(),
                    attribute: name.to_string(),
                })
        }
        other => Err(VarError::NoSuchAttribute {
            ty: other.clone(),
            attribute: name.to_string(),
        }),
    }
}
