//! Var Implementation
//!
//! A [`Var`] is an immutable symbolic value: a literal, a reference to a
//! state field, or an operation over other Vars. Its type and dependency set
//! are derived from the expression when the Var is built and can never be
//! changed independently afterwards. Composition returns a new Var.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

use crate::error::VarError;
use crate::value::Value;

use super::field::FieldKey;
use super::ops::{infer_call, infer_operation, Builtin, Callee, Op};
use super::types::VarType;

/// Operand list of an operation or call. Most operations are binary.
pub type Operands = SmallVec<[Box<Var>; 3]>;

/// The expression a Var stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    FieldRef(FieldKey),
    Operation { op: Op, operands: Operands },
    Call { callee: Callee, args: Operands },
}

/// A typed symbolic value.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    expr: Expr,
    ty: VarType,
    deps: BTreeSet<FieldKey>,
}

#[allow(clippy::should_implement_trait)]
impl Var {
    /// Wrap a literal value. Literals are constant and have no dependencies.
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.infer_type();
        Self::assemble(Expr::Literal(value), ty)
    }

    /// Reference a field of the container the Var is declared in.
    pub fn field(name: impl Into<String>, ty: VarType) -> Self {
        Self::reference(FieldKey::relative(name), ty)
    }

    /// Reference a field of the container at an absolute path.
    pub fn state_field(path: impl Into<String>, name: impl Into<String>, ty: VarType) -> Self {
        Self::reference(FieldKey::new(path, name), ty)
    }

    pub fn reference(key: FieldKey, ty: VarType) -> Self {
        Self::assemble(Expr::FieldRef(key), ty)
    }

    /// Apply an operation to the given operands, inferring the result type.
    pub fn operation(op: Op, operands: &[Var]) -> Result<Self, VarError> {
        if operands.len() != op.arity() {
            return Err(VarError::ArityMismatch {
                name: op.symbol().to_string(),
                expected: op.arity(),
                found: operands.len(),
            });
        }
        let ty = infer_operation(&op, operands)?;
        Ok(Self::assemble(
            Expr::Operation {
                op,
                operands: boxed(operands),
            },
            ty,
        ))
    }

    /// Combine `self` and `other` with a binary operator.
    pub fn compose(&self, op: Op, other: &Var) -> Result<Self, VarError> {
        Self::operation(op, &[self.clone(), other.clone()])
    }

    /// Call a builtin function by name.
    pub fn call(name: &str, args: &[Var]) -> Result<Self, VarError> {
        let builtin = Builtin::from_name(name).ok_or_else(|| VarError::UnknownFunction {
            name: name.to_string(),
        })?;
        let callee = Callee::Builtin(builtin);
        let ty = infer_call(&callee, args)?;
        Ok(Self::assemble(
            Expr::Call {
                callee,
                args: boxed(args),
            },
            ty,
        ))
    }

    /// Call a client-side function with an annotated return type.
    ///
    /// External calls render but cannot be evaluated on the server.
    pub fn call_external(name: impl Into<String>, args: &[Var], returns: VarType) -> Self {
        let callee = Callee::External {
            name: name.into(),
            returns: returns.clone(),
        };
        Self::assemble(
            Expr::Call {
                callee,
                args: boxed(args),
            },
            returns,
        )
    }

    /// `cond ? then : otherwise`
    pub fn cond(cond: &Var, then: &Var, otherwise: &Var) -> Result<Self, VarError> {
        Self::operation(Op::Cond, &[cond.clone(), then.clone(), otherwise.clone()])
    }

    pub fn add(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Add, other)
    }

    pub fn sub(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Sub, other)
    }

    pub fn mul(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Mul, other)
    }

    pub fn div(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Div, other)
    }

    pub fn floor_div(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::FloorDiv, other)
    }

    pub fn rem(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Mod, other)
    }

    pub fn pow(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Pow, other)
    }

    pub fn lt(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Lt, other)
    }

    pub fn le(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Le, other)
    }

    pub fn gt(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Gt, other)
    }

    pub fn ge(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Ge, other)
    }

    pub fn equals(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Eq, other)
    }

    pub fn not_equals(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Ne, other)
    }

    pub fn and(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::And, other)
    }

    pub fn or(&self, other: &Var) -> Result<Self, VarError> {
        self.compose(Op::Or, other)
    }

    pub fn contains(&self, item: &Var) -> Result<Self, VarError> {
        self.compose(Op::Contains, item)
    }

    pub fn index(&self, index: &Var) -> Result<Self, VarError> {
        self.compose(Op::Index, index)
    }

    pub fn attr(&self, name: &str) -> Result<Self, VarError> {
        self.compose(Op::Attr, &Var::literal(name))
    }

    pub fn neg(&self) -> Result<Self, VarError> {
        Self::operation(Op::Neg, &[self.clone()])
    }

    pub fn not(&self) -> Result<Self, VarError> {
        Self::operation(Op::Not, &[self.clone()])
    }

    pub fn length(&self) -> Result<Self, VarError> {
        Self::operation(Op::Length, &[self.clone()])
    }

    pub fn stringify(&self) -> Result<Self, VarError> {
        Self::operation(Op::Stringify, &[self.clone()])
    }

    /// Give an `Unknown` (or partly unknown) Var an explicit type.
    pub fn annotate(&self, ty: VarType) -> Result<Self, VarError> {
        Self::operation(Op::Annotate(ty), &[self.clone()])
    }

    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    pub fn var_type(&self) -> &VarType {
        &self.ty
    }

    /// State fields this Var reads, transitively.
    pub fn dependencies(&self) -> &BTreeSet<FieldKey> {
        &self.deps
    }

    /// Every field reference in the expression, with the type it is read as.
    pub fn references(&self) -> Vec<(&FieldKey, &VarType)> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'a>(&'a self, found: &mut Vec<(&'a FieldKey, &'a VarType)>) {
        match &self.expr {
            Expr::Literal(_) => {}
            Expr::FieldRef(key) => found.push((key, &self.ty)),
            Expr::Operation { operands: vars, .. } | Expr::Call { args: vars, .. } => {
                for var in vars {
                    var.collect_references(found);
                }
            }
        }
    }

    /// True when the expression contains no field reference.
    pub fn is_constant(&self) -> bool {
        self.deps.is_empty()
    }

    /// Resolve container-relative field references against `base`.
    pub fn rebased(&self, base: &str) -> Var {
        let expr = match &self.expr {
            Expr::Literal(_) => return self.clone(),
            Expr::FieldRef(key) => Expr::FieldRef(key.rebased(base)),
            Expr::Operation { op, operands } => Expr::Operation {
                op: op.clone(),
                operands: operands
                    .iter()
                    .map(|operand| Box::new(operand.rebased(base)))
                    .collect(),
            },
            Expr::Call { callee, args } => Expr::Call {
                callee: callee.clone(),
                args: args
                    .iter()
                    .map(|arg| Box::new(arg.rebased(base)))
                    .collect(),
            },
        };
        Self::assemble(expr, self.ty.clone())
    }

    fn assemble(expr: Expr, ty: VarType) -> Self {
        let deps = match &expr {
            Expr::Literal(_) => BTreeSet::new(),
            Expr::FieldRef(key) => BTreeSet::from([key.clone()]),
            Expr::Operation { operands: vars, .. } | Expr::Call { args: vars, .. } => vars
                .iter()
                .flat_map(|var| var.deps.iter().cloned())
                .collect(),
        };
        Self { expr, ty, deps }
    }
}

fn boxed(vars: &[Var]) -> Operands {
    vars.iter().cloned().map(Box::new).collect()
}

impl From<Value> for Var {
    fn from(value: Value) -> Self {
        Var::literal(value)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
