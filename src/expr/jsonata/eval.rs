//! Tree-walking evaluator over the JSONata AST.
//!
//! `None` models JSONata's `undefined`: absent fields, empty sequences, and
//! unbound variables all evaluate to it, and it propagates through most
//! operators rather than erroring.

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::functions;
use super::parser::{BinaryOp, Expr, UnaryOp};
use super::truthy;
use crate::errors::StatesError;
use crate::expr::num_value;
use crate::utils::json_ext::values_equal;

/// Variable bindings plus the root context for `$$`.
pub(crate) struct Env<'a> {
    pub(crate) bindings: &'a FxHashMap<String, Value>,
    pub(crate) root: Option<&'a Value>,
}

/// Collapse a result sequence: empty → undefined, singleton → the value.
fn seq(mut items: Vec<Value>) -> Option<Value> {
    match items.len() {
        0 => None,
        1 => Some(items.remove(0)),
        _ => Some(Value::Array(items)),
    }
}

/// Render a value the way `$string` does: strings pass through, numbers
/// drop a trailing `.0`, everything else is compact JSON.
pub(crate) fn to_string_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub(crate) fn eval(
    expr: &Expr,
    ctx: Option<&Value>,
    env: &Env<'_>,
) -> Result<Option<Value>, StatesError> {
    match expr {
        Expr::Number(n) => Ok(Some(num_value(*n))),
        Expr::Str(s) => Ok(Some(Value::String(s.clone()))),
        Expr::Bool(b) => Ok(Some(Value::Bool(*b))),
        Expr::Null => Ok(Some(Value::Null)),
        Expr::Context => Ok(ctx.cloned()),
        Expr::Root => Ok(env.root.cloned()),
        Expr::Var(name) => Ok(env.bindings.get(name).cloned()),
        Expr::Name(name) => eval_name(name, ctx, env),
        Expr::Map(lhs, rhs) => eval_map(lhs, rhs, ctx, env),
        Expr::Index(base, pred) => eval_index(base, pred, ctx, env),
        Expr::Unary(UnaryOp::Neg, operand) => match eval(operand, ctx, env)? {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(num_value(-n.as_f64().unwrap_or(0.0)))),
            Some(other) => Err(StatesError::runtime(format!(
                "cannot negate a {}",
                crate::utils::json_ext::value_type_name(&other)
            ))),
        },
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx, env),
        Expr::Ternary(cond, then, els) => {
            let c = eval(cond, ctx, env)?;
            if truthy(c.as_ref()) {
                eval(then, ctx, env)
            } else {
                eval(els, ctx, env)
            }
        }
        Expr::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = eval(item, ctx, env)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Expr::Object(entries) => {
            let mut out = serde_json::Map::new();
            for (key_expr, value_expr) in entries {
                let key = match eval(key_expr, ctx, env)? {
                    Some(v) => to_string_repr(&v),
                    None => continue,
                };
                if let Some(v) = eval(value_expr, ctx, env)? {
                    out.insert(key, v);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Expr::Call(name, args) => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, ctx, env)?);
            }
            functions::call(name, evaluated)
        }
    }
}

fn eval_name(
    name: &str,
    ctx: Option<&Value>,
    env: &Env<'_>,
) -> Result<Option<Value>, StatesError> {
    match ctx {
        Some(Value::Object(obj)) => Ok(obj.get(name).cloned()),
        Some(Value::Array(items)) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = eval_name(name, Some(item), env)? {
                    match v {
                        Value::Array(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
            }
            Ok(seq(out))
        }
        _ => Ok(None),
    }
}

fn eval_map(
    lhs: &Expr,
    rhs: &Expr,
    ctx: Option<&Value>,
    env: &Env<'_>,
) -> Result<Option<Value>, StatesError> {
    match eval(lhs, ctx, env)? {
        None => Ok(None),
        Some(Value::Array(items)) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(v) = eval(rhs, Some(&item), env)? {
                    match v {
                        Value::Array(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
            }
            Ok(seq(out))
        }
        Some(v) => eval(rhs, Some(&v), env),
    }
}

/// A numeric-literal predicate selects by position; anything else filters.
fn literal_index(pred: &Expr) -> Option<i64> {
    match pred {
        Expr::Number(n) => Some(n.floor() as i64),
        Expr::Unary(UnaryOp::Neg, inner) => match **inner {
            Expr::Number(n) => Some(-(n.floor() as i64)),
            _ => None,
        },
        _ => None,
    }
}

fn eval_index(
    base: &Expr,
    pred: &Expr,
    ctx: Option<&Value>,
    env: &Env<'_>,
) -> Result<Option<Value>, StatesError> {
    let Some(base_value) = eval(base, ctx, env)? else {
        return Ok(None);
    };
    let items = match base_value {
        Value::Array(a) => a,
        other => vec![other],
    };
    if let Some(index) = literal_index(pred) {
        let resolved = if index < 0 {
            items.len() as i64 + index
        } else {
            index
        };
        if resolved < 0 {
            return Ok(None);
        }
        return Ok(items.into_iter().nth(resolved as usize));
    }
    let mut out = Vec::new();
    for item in items {
        let keep = truthy(eval(pred, Some(&item), env)?.as_ref());
        if keep {
            out.push(item);
        }
    }
    Ok(seq(out))
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: Option<&Value>,
    env: &Env<'_>,
) -> Result<Option<Value>, StatesError> {
    // `and`/`or` use truthiness and never error on operand types.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = truthy(eval(lhs, ctx, env)?.as_ref());
        let result = match op {
            BinaryOp::And => l && truthy(eval(rhs, ctx, env)?.as_ref()),
            _ => l || truthy(eval(rhs, ctx, env)?.as_ref()),
        };
        return Ok(Some(Value::Bool(result)));
    }

    let l = eval(lhs, ctx, env)?;
    let r = eval(rhs, ctx, env)?;

    match op {
        BinaryOp::Concat => {
            let ls = l.as_ref().map(to_string_repr).unwrap_or_default();
            let rs = r.as_ref().map(to_string_repr).unwrap_or_default();
            Ok(Some(Value::String(format!("{ls}{rs}"))))
        }
        BinaryOp::Eq => Ok(Some(Value::Bool(option_equal(&l, &r)))),
        BinaryOp::Ne => Ok(Some(Value::Bool(!option_equal(&l, &r)))),
        BinaryOp::In => {
            let result = match (&l, &r) {
                (Some(needle), Some(Value::Array(items))) => {
                    items.iter().any(|item| values_equal(item, needle))
                }
                (Some(needle), Some(single)) => values_equal(single, needle),
                _ => false,
            };
            Ok(Some(Value::Bool(result)))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (Some(lv), Some(rv)) = (&l, &r) else {
                return Ok(Some(Value::Bool(false)));
            };
            let ord = match (lv, rv) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(x, y)| x.partial_cmp(&y)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(StatesError::runtime(
                        "comparison operands must both be numbers or both be strings",
                    ));
                }
            };
            let Some(ord) = ord else {
                return Ok(Some(Value::Bool(false)));
            };
            let result = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Some(Value::Bool(result)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Some(lv), Some(rv)) = (&l, &r) else {
                return Ok(None);
            };
            let (Some(a), Some(b)) = (lv.as_f64(), rv.as_f64()) else {
                return Err(StatesError::runtime(format!(
                    "arithmetic operands must be numbers, got {} and {}",
                    crate::utils::json_ext::value_type_name(lv),
                    crate::utils::json_ext::value_type_name(rv)
                )));
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(StatesError::runtime("division by zero"));
                    }
                    a / b
                }
                _ => {
                    if b == 0.0 {
                        return Err(StatesError::runtime("division by zero"));
                    }
                    a % b
                }
            };
            Ok(Some(num_value(result)))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn option_equal(l: &Option<Value>, r: &Option<Value>) -> bool {
    match (l, r) {
        (Some(a), Some(b)) => values_equal(a, b),
        (None, None) => true,
        _ => false,
    }
}
