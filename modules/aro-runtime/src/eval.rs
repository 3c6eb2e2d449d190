//! Expression evaluation against a context.
//!
//! Missing variables evaluate to null; comparisons between values that cannot
//! be ordered are false. Only arithmetic on non-numbers and malformed regexes
//! are errors.

use regex::Regex;

use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::context::RuntimeContext;
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot negate {0}")]
    InvalidNegation(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub fn evaluate(expr: &Expression, ctx: &RuntimeContext) -> Result<Value, EvalError> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Variable {
            name,
            path,
            specifier,
        } => {
            let Some(root) = ctx.resolve(name) else {
                return Ok(Value::Null);
            };
            let value = if path.is_empty() {
                root
            } else {
                root.path(path).cloned().unwrap_or_default()
            };
            Ok(specifier.apply(&value))
        }
        Expression::List(items) => items
            .iter()
            .map(|item| evaluate(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expression::Map(entries) => entries
            .iter()
            .map(|(k, v)| evaluate(v, ctx).map(|v| (k.clone(), v)))
            .collect::<Result<_, _>>()
            .map(Value::Map),
        Expression::Unary { op, operand } => {
            let v = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(EvalError::InvalidNegation(other.type_name())),
                },
            }
        }
        Expression::Binary { op, left, right } => {
            // Short-circuit before evaluating the right side.
            match op {
                BinaryOp::And => {
                    let l = evaluate(left, ctx)?;
                    if !l.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    return Ok(Value::Bool(evaluate(right, ctx)?.is_truthy()));
                }
                BinaryOp::Or => {
                    let l = evaluate(left, ctx)?;
                    if l.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    return Ok(Value::Bool(evaluate(right, ctx)?.is_truthy()));
                }
                _ => {}
            }
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            binary(*op, l, r)
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering::*;

    let ordered = |accept: &[std::cmp::Ordering]| {
        Value::Bool(l.compare(&r).is_some_and(|o| accept.contains(&o)))
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
        BinaryOp::Ne => Ok(Value::Bool(!l.loose_eq(&r))),
        BinaryOp::Lt => Ok(ordered(&[Less])),
        BinaryOp::Le => Ok(ordered(&[Less, Equal])),
        BinaryOp::Gt => Ok(ordered(&[Greater])),
        BinaryOp::Ge => Ok(ordered(&[Greater, Equal])),
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => l.is_truthy() && r.is_truthy(),
            _ => l.is_truthy() || r.is_truthy(),
        })),
        BinaryOp::Add => match (&l, &r) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(op, &l, &r),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, &l, &r),
        BinaryOp::Concat => Ok(Value::String(format!(
            "{}{}",
            l.to_display_string(),
            r.to_display_string()
        ))),
        BinaryOp::Contains => Ok(Value::Bool(match &l {
            Value::List(items) => items.iter().any(|item| item.loose_eq(&r)),
            Value::Map(map) => r.as_str().is_some_and(|k| map.contains_key(k)),
            Value::String(s) => s.contains(&r.to_display_string()),
            _ => false,
        })),
        BinaryOp::Matches => {
            let pattern = r.to_display_string();
            let re = compile_regex(&pattern)?;
            Ok(Value::Bool(!l.is_null() && re.is_match(&l.to_display_string())))
        }
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        _ => "%",
    };
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let out = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.checked_div(b).ok_or(EvalError::DivisionByZero)?,
                _ => a.checked_rem(b).ok_or(EvalError::DivisionByZero)?,
            };
            Ok(Value::Int(out))
        }
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => {
                if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
            _ => Err(EvalError::TypeMismatch {
                op: symbol,
                left: l.type_name(),
                right: r.type_name(),
            }),
        },
    }
}

pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|source| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}
