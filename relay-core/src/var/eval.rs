//! Server-Side Evaluation
//!
//! Computed fields are defined by Var expressions, so the delta engine needs
//! to evaluate a Var against the live values of a state tree. Semantics follow
//! the rendered client code (truncating `%`, flooring `//`, short-circuiting
//! `and`/`or`, JavaScript number formatting) so the server and the browser
//! agree on every derived value.
//!
//! Two cases deliberately fail on the server where the client would not: an
//! integer raised to a negative power, and repetitions longer than
//! [`MAX_REPEAT_LEN`].

use std::cmp::Ordering;

use crate::error::EvalError;
use crate::value::Value;

use super::expr::{Expr, Var};
use super::field::FieldKey;
use super::ops::{Builtin, Callee, Op};

/// Longest string (in bytes) or list a repetition may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 20;

/// Supplies field values while a Var is evaluated.
///
/// Takes `&mut self` so a state tree can recompute stale computed fields on
/// demand.
pub trait FieldSource {
    fn field_value(&mut self, key: &FieldKey) -> Result<Value, EvalError>;
}

/// A source without fields, for evaluating constant Vars.
pub struct NoFields;

impl FieldSource for NoFields {
    fn field_value(&mut self, key: &FieldKey) -> Result<Value, EvalError> {
        Err(EvalError::UnknownField { field: key.clone() })
    }
}

impl Var {
    /// Evaluate the Var, reading fields from `source`.
    pub fn evaluate(&self, source: &mut dyn FieldSource) -> Result<Value, EvalError> {
        match self.expression() {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::FieldRef(key) => source.field_value(key),
            Expr::Operation { op, operands } => eval_operation(op, operands, source),
            Expr::Call { callee, args } => {
                let builtin = match callee {
                    Callee::Builtin(builtin) => *builtin,
                    Callee::External { name, .. } => {
                        return Err(EvalError::RenderOnlyFunction { name: name.clone() })
                    }
                };
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(source))
                    .collect::<Result<Vec<_>, _>>()?;
                eval_builtin(builtin, values)
            }
        }
    }

    /// Evaluate a Var that has no dependencies.
    pub fn evaluate_constant(&self) -> Result<Value, EvalError> {
        self.evaluate(&mut NoFields)
    }
}

fn invalid(op: impl ToString, value: &Value) -> EvalError {
    EvalError::InvalidOperand {
        op: op.to_string(),
        found: value.kind().to_string(),
    }
}

fn overflow(op: &Op) -> EvalError {
    EvalError::Overflow {
        op: op.symbol().to_string(),
    }
}

fn eval_operation(
    op: &Op,
    operands: &[Box<Var>],
    source: &mut dyn FieldSource,
) -> Result<Value, EvalError> {
    // Lazily evaluated operators first
    match op {
        Op::Cond => {
            let cond = operands[0].evaluate(source)?;
            let branch = if cond.is_truthy() { &operands[1] } else { &operands[2] };
            return branch.evaluate(source);
        }
        Op::And => {
            let left = operands[0].evaluate(source)?;
            return if left.is_truthy() {
                operands[1].evaluate(source)
            } else {
                Ok(left)
            };
        }
        Op::Or => {
            let left = operands[0].evaluate(source)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                operands[1].evaluate(source)
            };
        }
        _ => {}
    }

    let mut values = operands
        .iter()
        .map(|operand| operand.evaluate(source))
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() == 1 {
        let value = values.remove(0);
        return eval_unary(op, value);
    }

    let right = values.remove(1);
    let left = values.remove(0);
    eval_binary(op, left, right)
}

fn eval_unary(op: &Op, value: Value) -> Result<Value, EvalError> {
    match op {
        Op::Neg => match value {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow(op)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(invalid(op, &other)),
        },
        Op::Not => Ok(Value::Bool(!value.is_truthy())),
        Op::Length => match &value {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(map) => Ok(Value::Int(map.len() as i64)),
            other => Err(invalid(op, other)),
        },
        Op::Stringify => Ok(Value::Str(stringify(&value))),
        Op::Annotate(_) => Ok(value),
        _ => Err(invalid(op, &value)),
    }
}

fn eval_binary(op: &Op, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        Op::Add => match (left, right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (a, b) => numeric(op, &a, &b, i64::checked_add, |x, y| x + y),
        },
        Op::Sub => numeric(op, &left, &right, i64::checked_sub, |x, y| x - y),
        Op::Mul => match (left, right) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = repeat_count(op, s.len(), n)?;
                Ok(Value::Str(s.repeat(count)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let count = repeat_count(op, items.len(), n)?;
                let mut repeated = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    repeated.extend(items.iter().cloned());
                }
                Ok(Value::List(repeated))
            }
            (a, b) => numeric(op, &a, &b, i64::checked_mul, |x, y| x * y),
        },
        Op::Div => {
            let (a, b) = floats(op, &left, &right)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        }
        Op::FloorDiv => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                let quotient = a.checked_div(*b).ok_or_else(|| overflow(op))?;
                let adjust = (a % b != 0) && ((*a < 0) != (*b < 0));
                Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
            }
            _ => {
                let (a, b) = floats(op, &left, &right)?;
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float((a / b).floor()))
            }
        },
        Op::Mod => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => a
                .checked_rem(*b)
                .map(Value::Int)
                .ok_or_else(|| overflow(op)),
            _ => {
                let (a, b) = floats(op, &left, &right)?;
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float(a % b))
            }
        },
        Op::Pow => match (&left, &right) {
            (Value::Int(_), Value::Int(exp)) if *exp < 0 => {
                Err(EvalError::NegativeExponent { exponent: *exp })
            }
            (Value::Int(base), Value::Int(exp)) => {
                let exp = u32::try_from(*exp).map_err(|_| overflow(op))?;
                base.checked_pow(exp).map(Value::Int).ok_or_else(|| overflow(op))
            }
            _ => {
                let (a, b) = floats(op, &left, &right)?;
                Ok(Value::Float(a.powf(b)))
            }
        },
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ordering = compare(op, &left, &right)?;
            Ok(Value::Bool(match op {
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        Op::Eq => Ok(Value::Bool(loosely_equal(&left, &right))),
        Op::Ne => Ok(Value::Bool(!loosely_equal(&left, &right))),
        Op::Contains => match (&left, &right) {
            (Value::List(items), item) => {
                Ok(Value::Bool(items.iter().any(|i| loosely_equal(i, item))))
            }
            (Value::Str(haystack), Value::Str(needle)) => {
                Ok(Value::Bool(haystack.contains(needle.as_str())))
            }
            (Value::Map(map), Value::Str(key)) => Ok(Value::Bool(map.contains_key(key))),
            (container, _) => Err(invalid(op, container)),
        },
        Op::Index => index(op, left, &right),
        Op::Attr => match (left, right) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Map(mut map), Value::Str(name)) => map
                .remove(&name)
                .ok_or(EvalError::MissingKey { key: name }),
            (other, _) => Err(invalid(op, &other)),
        },
        _ => Err(invalid(op, &left)),
    }
}

/// How many copies `unit * n` makes. Negative counts repeat nothing.
fn repeat_count(op: &Op, unit: usize, n: i64) -> Result<usize, EvalError> {
    if unit == 0 || n <= 0 {
        return Ok(0);
    }
    let count = usize::try_from(n).map_err(|_| overflow(op))?;
    match unit.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(EvalError::SizeLimit {
            op: op.symbol().to_string(),
            limit: MAX_REPEAT_LEN,
        }),
    }
}

fn numeric(
    op: &Op,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b).map(Value::Int).ok_or_else(|| overflow(op)),
        _ => {
            let (a, b) = floats(op, left, right)?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn floats(op: &Op, left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    let a = left.as_f64().ok_or_else(|| invalid(op, left))?;
    let b = right.as_f64().ok_or_else(|| invalid(op, right))?;
    Ok((a, b))
}

fn compare(op: &Op, left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => {
            let (a, b) = floats(op, left, right)?;
            a.partial_cmp(&b).ok_or_else(|| invalid(op, left))
        }
    }
}

/// Equality that treats `1` and `1.0` as equal, like the client does.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (a, b) => a == b,
    }
}

fn index(op: &Op, container: Value, index: &Value) -> Result<Value, EvalError> {
    match (container, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(mut items), Value::Int(i)) => {
            let position = resolve_index(*i, items.len())?;
            Ok(items.swap_remove(position))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let position = resolve_index(*i, chars.len())?;
            Ok(Value::Str(chars[position].to_string()))
        }
        (Value::Map(mut map), Value::Str(key)) => map
            .remove(key)
            .ok_or_else(|| EvalError::MissingKey { key: key.clone() }),
        (other, _) => Err(invalid(op, &other)),
    }
}

/// Negative indices count from the end, matching `Array.prototype.at`.
fn resolve_index(index: i64, len: usize) -> Result<usize, EvalError> {
    let signed_len = len as i64;
    let position = if index < 0 { signed_len + index } else { index };
    if position < 0 || position >= signed_len {
        return Err(EvalError::IndexOutOfRange { index, len });
    }
    Ok(position as usize)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => js_number(*f),
        other => other.to_string(),
    }
}

/// Format a float the way JavaScript's `String(number)` does: shortest
/// round-trip digits, positional between 1e-7 and 1e21, exponential outside.
fn js_number(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest round-trip digits as `d[.ddd]e<exp>`
    let scientific = format!("{:e}", f.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let k = digits.len() as i32;
    // Decimal point position relative to the digits
    let n = exponent.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let (first, rest) = digits.split_at(1);
        let sign = if n - 1 < 0 { '-' } else { '+' };
        let mantissa = if rest.is_empty() {
            first.to_string()
        } else {
            format!("{first}.{rest}")
        };
        format!("{mantissa}e{sign}{}", (n - 1).abs())
    };

    if f < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}

fn eval_builtin(builtin: Builtin, mut args: Vec<Value>) -> Result<Value, EvalError> {
    let name = builtin.name();
    match builtin {
        Builtin::Abs => match &args[0] {
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or(EvalError::Overflow {
                op: name.to_string(),
            }),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(invalid(name, other)),
        },
        Builtin::Round => match &args[0] {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => {
                let rounded = (f + 0.5).floor();
                if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                    Ok(Value::Int(rounded as i64))
                } else {
                    Err(EvalError::Overflow {
                        op: name.to_string(),
                    })
                }
            }
            other => Err(invalid(name, other)),
        },
        Builtin::Min | Builtin::Max => {
            let pick_left = match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => {
                    if builtin == Builtin::Min { a <= b } else { a >= b }
                }
                (a, b) => {
                    let x = a.as_f64().ok_or_else(|| invalid(name, a))?;
                    let y = b.as_f64().ok_or_else(|| invalid(name, b))?;
                    let picked = if builtin == Builtin::Min { x.min(y) } else { x.max(y) };
                    return Ok(Value::Float(picked));
                }
            };
            Ok(args.swap_remove(if pick_left { 0 } else { 1 }))
        }
        Builtin::Upper | Builtin::Lower | Builtin::Trim => {
            let s = args[0].as_str().ok_or_else(|| invalid(name, &args[0]))?;
            Ok(Value::Str(match builtin {
                Builtin::Upper => s.to_uppercase(),
                Builtin::Lower => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        Builtin::Join => {
            let separator = args[1].as_str().ok_or_else(|| invalid(name, &args[1]))?;
            let items = args[0].as_list().ok_or_else(|| invalid(name, &args[0]))?;
            let parts = items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| invalid(name, item)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(separator)))
        }
        Builtin::Split => {
            let s = args[0].as_str().ok_or_else(|| invalid(name, &args[0]))?;
            let separator = args[1].as_str().ok_or_else(|| invalid(name, &args[1]))?;
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(separator).map(Value::from).collect()
            };
            Ok(Value::List(parts))
        }
        Builtin::Keys => match &args[0] {
            Value::Map(map) => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
            other => Err(invalid(name, other)),
        },
        Builtin::Values => match args.swap_remove(0) {
            Value::Map(map) => Ok(Value::List(map.into_values().collect())),
            other => Err(invalid(name, &other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::VarType;
    use std::collections::HashMap;

    struct MapSource(HashMap<FieldKey, Value>);

    impl FieldSource for MapSource {
        fn field_value(&mut self, key: &FieldKey) -> Result<Value, EvalError> {
            self.0
                .get(key)
                .cloned()
                .ok_or_else(|| EvalError::UnknownField { field: key.clone() })
        }
    }

    fn source(entries: &[(&str, Value)]) -> MapSource {
        MapSource(
            entries
                .iter()
                .map(|(name, value)| (FieldKey::new("app", *name), value.clone()))
                .collect(),
        )
    }

    fn field(name: &str, ty: VarType) -> Var {
        Var::state_field("app", name, ty)
    }

    #[test]
    fn arithmetic_over_fields() {
        let count = field("count", VarType::Int);
        let doubled = count.mul(&Var::literal(2)).unwrap();
        let mut src = source(&[("count", Value::Int(21))]);
        assert_eq!(doubled.evaluate(&mut src).unwrap(), Value::Int(42));
    }

    #[test]
    fn floor_div_and_mod_match_client() {
        let floor = Var::literal(-7).floor_div(&Var::literal(2)).unwrap();
        assert_eq!(floor.evaluate_constant().unwrap(), Value::Int(-4));

        let rem = Var::literal(-7).rem(&Var::literal(2)).unwrap();
        assert_eq!(rem.evaluate_constant().unwrap(), Value::Int(-1));

        let div = Var::literal(7).div(&Var::literal(2)).unwrap();
        assert_eq!(div.evaluate_constant().unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let div = Var::literal(1).div(&Var::literal(0)).unwrap();
        assert_eq!(div.evaluate_constant(), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn overflow_is_reported() {
        let big = Var::literal(i64::MAX).add(&Var::literal(1)).unwrap();
        assert!(matches!(big.evaluate_constant(), Err(EvalError::Overflow { .. })));
    }

    #[test]
    fn cond_only_evaluates_taken_branch() {
        let flag = field("flag", VarType::Bool);
        let missing = field("missing", VarType::Int);
        let picked = Var::cond(&flag, &Var::literal(1), &missing).unwrap();

        let mut src = source(&[("flag", Value::Bool(true))]);
        assert_eq!(picked.evaluate(&mut src).unwrap(), Value::Int(1));
    }

    #[test]
    fn indexing_and_attributes() {
        let items = field("items", VarType::sequence(VarType::Str));
        let last = items.index(&Var::literal(-1)).unwrap();
        let mut src = source(&[("items", Value::from(vec!["a", "b", "c"]))]);
        assert_eq!(last.evaluate(&mut src).unwrap(), Value::from("c"));

        let out_of_range = items.index(&Var::literal(5)).unwrap();
        assert_eq!(
            out_of_range.evaluate(&mut src),
            Err(EvalError::IndexOutOfRange { index: 5, len: 3 })
        );
    }

    #[test]
    fn builtins_evaluate() {
        let words = Var::literal(Value::from(vec!["a", "b"]));
        let joined = Var::call("join", &[words, Var::literal("-")]).unwrap();
        assert_eq!(joined.evaluate_constant().unwrap(), Value::from("a-b"));

        let upper = Var::call("upper", &[Var::literal("hi")]).unwrap();
        assert_eq!(upper.evaluate_constant().unwrap(), Value::from("HI"));

        let rounded = Var::call("round", &[Var::literal(2.5)]).unwrap();
        assert_eq!(rounded.evaluate_constant().unwrap(), Value::Int(3));

        let max = Var::call("max", &[Var::literal(2), Var::literal(9)]).unwrap();
        assert_eq!(max.evaluate_constant().unwrap(), Value::Int(9));
    }

    #[test]
    fn external_calls_are_render_only() {
        let call = Var::call_external("formatDate", &[Var::literal(0)], VarType::Str);
        assert_eq!(
            call.evaluate_constant(),
            Err(EvalError::RenderOnlyFunction {
                name: "formatDate".into()
            })
        );
    }

    #[test]
    fn oversized_repetition_is_an_error() {
        let n = field("n", VarType::Int);
        let pair = Var::literal(Value::from(vec![1, 2]));
        let list = pair.mul(&n).unwrap();
        let text = Var::literal("ab").mul(&n).unwrap();

        let mut src = source(&[("n", Value::Int(i64::MAX))]);
        let limit = EvalError::SizeLimit {
            op: "*".into(),
            limit: MAX_REPEAT_LEN,
        };
        assert_eq!(list.evaluate(&mut src), Err(limit.clone()));
        assert_eq!(text.evaluate(&mut src), Err(limit));

        let mut src = source(&[("n", Value::Int(3))]);
        assert_eq!(
            list.evaluate(&mut src).unwrap(),
            Value::from(vec![1, 2, 1, 2, 1, 2])
        );
        assert_eq!(text.evaluate(&mut src).unwrap(), Value::from("ababab"));

        let mut src = source(&[("n", Value::Int(-4))]);
        assert_eq!(text.evaluate(&mut src).unwrap(), Value::from(""));
    }

    #[test]
    fn integer_power_keeps_its_type() {
        let inverse = Var::literal(2).pow(&Var::literal(-1)).unwrap();
        assert_eq!(inverse.var_type(), &VarType::Int);
        assert_eq!(
            inverse.evaluate_constant(),
            Err(EvalError::NegativeExponent { exponent: -1 })
        );

        let cube = Var::literal(2).pow(&Var::literal(3)).unwrap();
        assert_eq!(cube.evaluate_constant().unwrap(), Value::Int(8));

        let half = Var::literal(2.0).pow(&Var::literal(-1)).unwrap();
        assert_eq!(half.evaluate_constant().unwrap(), Value::Float(0.5));
    }

    #[test]
    fn floats_stringify_like_javascript() {
        let cases = [
            (1e21, "1e+21"),
            (1e20, "100000000000000000000"),
            (1.5, "1.5"),
            (3.0, "3"),
            (123456.789, "123456.789"),
            (0.000001, "0.000001"),
            (1e-7, "1e-7"),
            (-2.5e-10, "-2.5e-10"),
            (-0.0, "0"),
            (f64::INFINITY, "Infinity"),
        ];
        for (value, expected) in cases {
            let text = Var::literal(value).stringify().unwrap();
            assert_eq!(text.evaluate_constant().unwrap(), Value::from(expected), "{value}");
        }
    }

    #[test]
    fn equality_is_numeric_aware() {
        let eq = Var::literal(1).equals(&Var::literal(1.0)).unwrap();
        assert_eq!(eq.evaluate_constant().unwrap(), Value::Bool(true));
    }
}
