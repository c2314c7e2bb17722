//! JavaScript Rendering
//!
//! Lowers a Var expression into the JavaScript source the component compiler
//! embeds into generated pages. Each operation code maps to one lowering rule;
//! binary operators are always parenthesized so operand precedence never has
//! to be reconstructed.
//!
//! Field references render as `state["<container path>"].<field>`, reading
//! from the client-side state store that deltas are applied to.

use serde::Serialize;

use crate::error::VarError;

use super::expr::{Expr, Var};
use super::field::{is_identifier, FieldKey};
use super::ops::{Builtin, Callee, Op};
use super::types::VarType;

/// Output of the compile step: the source string plus its inferred type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledVar {
    pub source: String,
    #[serde(rename = "type")]
    pub ty: VarType,
}

impl Var {
    /// Render the expression as JavaScript source.
    ///
    /// Relative field references render as `self.<field>`; they are only
    /// meaningful for display and are rejected by [`Var::compile`].
    pub fn render(&self) -> String {
        match self.expression() {
            Expr::Literal(value) => value.to_string(),
            Expr::FieldRef(key) => render_field(key),
            Expr::Operation { op, operands } => render_operation(op, operands),
            Expr::Call { callee, args } => render_call(callee, args),
        }
    }

    /// Final compile step for the component compiler.
    ///
    /// Fails if the Var still holds container-relative references or if its
    /// type is `Unknown` and was never annotated.
    pub fn compile(&self) -> Result<CompiledVar, VarError> {
        if let Some(key) = self.dependencies().iter().find(|key| key.is_relative()) {
            return Err(VarError::RelativeReference {
                field: key.field.clone(),
            });
        }
        if self.var_type().is_unknown() {
            return Err(VarError::UnresolvedType {
                expression: self.render(),
                ty: self.var_type().clone(),
            });
        }
        Ok(CompiledVar {
            source: self.render(),
            ty: self.var_type().clone(),
        })
    }
}

fn render_field(key: &FieldKey) -> String {
    if key.is_relative() {
        format!("self.{}", key.field)
    } else {
        format!("state[{}].{}", quote(&key.path), key.field)
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Member access operator for a receiver of the given type.
fn chain(ty: &VarType) -> &'static str {
    match ty {
        VarType::Optional(_) | VarType::Unknown | VarType::Null => "?.",
        _ => ".",
    }
}

fn is_keyed(ty: &VarType) -> bool {
    match ty {
        VarType::Mapping(_) | VarType::Object(_) => true,
        VarType::Optional(inner) => is_keyed(inner),
        _ => false,
    }
}

fn render_operation(op: &Op, operands: &[Box<Var>]) -> String {
    let arg = |i: usize| operands[i].render();
    let ty = |i: usize| operands[i].var_type();

    match op {
        Op::Add => match (ty(0), ty(1)) {
            (VarType::Sequence(_), VarType::Sequence(_)) => format!("[...{}, ...{}]", arg(0), arg(1)),
            _ => binary(&arg(0), "+", &arg(1)),
        },
        Op::Mul => match (ty(0), ty(1)) {
            (VarType::Str, VarType::Int) => format!("{}.repeat({})", arg(0), arg(1)),
            (VarType::Int, VarType::Str) => format!("{}.repeat({})", arg(1), arg(0)),
            (VarType::Sequence(_), VarType::Int) => repeat_list(&arg(0), &arg(1)),
            (VarType::Int, VarType::Sequence(_)) => repeat_list(&arg(1), &arg(0)),
            _ => binary(&arg(0), "*", &arg(1)),
        },
        Op::Sub => binary(&arg(0), "-", &arg(1)),
        Op::Div => binary(&arg(0), "/", &arg(1)),
        Op::FloorDiv => format!("Math.floor({} / {})", arg(0), arg(1)),
        Op::Mod => binary(&arg(0), "%", &arg(1)),
        Op::Pow => binary(&arg(0), "**", &arg(1)),
        Op::Neg => format!("(-{})", arg(0)),

        Op::Lt => binary(&arg(0), "<", &arg(1)),
        Op::Le => binary(&arg(0), "<=", &arg(1)),
        Op::Gt => binary(&arg(0), ">", &arg(1)),
        Op::Ge => binary(&arg(0), ">=", &arg(1)),
        Op::Eq => binary(&arg(0), "===", &arg(1)),
        Op::Ne => binary(&arg(0), "!==", &arg(1)),

        Op::And => binary(&arg(0), "&&", &arg(1)),
        Op::Or => binary(&arg(0), "||", &arg(1)),
        Op::Not => format!("(!{})", arg(0)),

        Op::Contains => {
            if is_keyed(ty(0)) {
                format!("Object.hasOwn({}, {})", arg(0), arg(1))
            } else {
                format!("{}{}includes({})", arg(0), chain(ty(0)), arg(1))
            }
        }
        Op::Index => {
            let access = if is_keyed(ty(0)) {
                format!("[{}]", arg(1))
            } else {
                format!("at({})", arg(1))
            };
            let sep = match (chain(ty(0)), access.starts_with('[')) {
                ("?.", _) => "?.",
                (_, true) => "",
                (_, false) => ".",
            };
            format!("{}{}{}", arg(0), sep, access)
        }
        Op::Attr => {
            let name = match operands[1].expression() {
                Expr::Literal(value) => value.as_str().unwrap_or_default().to_string(),
                _ => arg(1),
            };
            if is_identifier(&name) {
                format!("{}{}{}", arg(0), chain(ty(0)), name)
            } else {
                format!("{}?.[{}]", arg(0), quote(&name))
            }
        }
        Op::Length => {
            if is_keyed(ty(0)) {
                format!("Object.keys({}).length", arg(0))
            } else {
                format!("{}{}length", arg(0), chain(ty(0)))
            }
        }

        Op::Stringify => format!("String({})", arg(0)),
        Op::Cond => format!("({} ? {} : {})", arg(0), arg(1), arg(2)),
        Op::Annotate(_) => arg(0),
    }
}

fn binary(left: &str, symbol: &str, right: &str) -> String {
    format!("({left} {symbol} {right})")
}

fn repeat_list(list: &str, count: &str) -> String {
    format!("Array.from({{ length: {count} }}, () => {list}).flat()")
}

fn render_call(callee: &Callee, args: &[Box<Var>]) -> String {
    let arg = |i: usize| args[i].render();

    let builtin = match callee {
        Callee::Builtin(builtin) => builtin,
        Callee::External { name, .. } => {
            let rendered: Vec<String> = args.iter().map(|a| a.render()).collect();
            return format!("{}({})", name, rendered.join(", "));
        }
    };

    match builtin {
        Builtin::Abs => format!("Math.abs({})", arg(0)),
        Builtin::Round => format!("Math.round({})", arg(0)),
        Builtin::Min => format!("Math.min({}, {})", arg(0), arg(1)),
        Builtin::Max => format!("Math.max({}, {})", arg(0), arg(1)),
        Builtin::Upper => format!("{}.toUpperCase()", arg(0)),
        Builtin::Lower => format!("{}.toLowerCase()", arg(0)),
        Builtin::Trim => format!("{}.trim()", arg(0)),
        Builtin::Join => format!("{}.join({})", arg(0), arg(1)),
        Builtin::Split => format!("{}.split({})", arg(0), arg(1)),
        Builtin::Keys => format!("Object.keys({})", arg(0)),
        Builtin::Values => format!("Object.values({})", arg(0)),
    }
}
