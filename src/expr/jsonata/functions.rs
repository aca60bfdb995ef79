//! Built-in function library plus the Step Functions extensions.

use serde_json::{Map, Value, json};

use super::eval::to_string_repr;
use super::truthy;
use crate::errors::StatesError;
use crate::expr::intrinsics::{hash_hex, seeded_fraction};
use crate::expr::num_value;

type FnResult = Result<Option<Value>, StatesError>;

pub(crate) fn call(name: &str, args: Vec<Option<Value>>) -> FnResult {
    match name {
        // Step Functions extensions
        "partition" => partition(args),
        "range" => range(args),
        "hash" => hash(args),
        "random" => random(args),
        "uuid" => Ok(Some(Value::String(uuid::Uuid::new_v4().to_string()))),
        "parse" => parse(args),
        // General library
        "string" => Ok(arg(&args, 0).map(|v| Value::String(to_string_repr(v)))),
        "number" => number(args),
        "boolean" => Ok(Some(Value::Bool(truthy(arg(&args, 0))))),
        "not" => Ok(Some(Value::Bool(!truthy(arg(&args, 0))))),
        "exists" => Ok(Some(Value::Bool(arg(&args, 0).is_some()))),
        "count" => Ok(Some(json!(match arg(&args, 0) {
            None => 0,
            Some(Value::Array(a)) => a.len(),
            Some(_) => 1,
        }))),
        "sum" => fold_numbers(name, args, |nums| nums.iter().sum()),
        "max" => fold_numbers(name, args, |nums| {
            nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        }),
        "min" => fold_numbers(name, args, |nums| {
            nums.iter().cloned().fold(f64::INFINITY, f64::min)
        }),
        "average" => fold_numbers(name, args, |nums| {
            nums.iter().sum::<f64>() / nums.len() as f64
        }),
        "abs" => map_number(name, args, f64::abs),
        "floor" => map_number(name, args, f64::floor),
        "ceil" => map_number(name, args, f64::ceil),
        "round" => map_number(name, args, f64::round),
        "sqrt" => map_number(name, args, f64::sqrt),
        "power" => power(args),
        "uppercase" => map_string(name, args, |s| s.to_uppercase()),
        "lowercase" => map_string(name, args, |s| s.to_lowercase()),
        "trim" => map_string(name, args, |s| s.trim().to_string()),
        "length" => match arg(&args, 0) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(json!(s.chars().count()))),
            Some(_) => Err(type_error(name, "a string")),
        },
        "substring" => substring(args),
        "contains" => contains(args),
        "split" => split(args),
        "join" => join(args),
        "replace" => replace(args),
        "keys" => match arg(&args, 0) {
            Some(Value::Object(o)) => Ok(Some(Value::Array(
                o.keys().map(|k| Value::String(k.clone())).collect(),
            ))),
            _ => Ok(None),
        },
        "values" => match arg(&args, 0) {
            Some(Value::Object(o)) => Ok(Some(Value::Array(o.values().cloned().collect()))),
            _ => Ok(None),
        },
        "append" => append(args),
        "merge" => merge(args),
        "distinct" => distinct(args),
        other => Err(StatesError::runtime(format!("Unknown function: ${other}"))),
    }
}

fn arg(args: &[Option<Value>], index: usize) -> Option<&Value> {
    args.get(index).and_then(Option::as_ref)
}

fn type_error(name: &str, expected: &str) -> StatesError {
    StatesError::runtime(format!("${name} expects {expected}"))
}

fn require_number(name: &str, v: Option<&Value>) -> Result<f64, StatesError> {
    v.and_then(Value::as_f64)
        .ok_or_else(|| type_error(name, "a number"))
}

/// `$partition(arr, n)` — undefined for empty or non-array input.
fn partition(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::Array(items)) = arg(&args, 0) else {
        return Ok(None);
    };
    if items.is_empty() {
        return Ok(None);
    }
    let size = require_number("partition", arg(&args, 1))?;
    if size < 1.0 {
        return Err(StatesError::runtime("$partition size must be at least 1"));
    }
    Ok(Some(Value::Array(
        items
            .chunks(size as usize)
            .map(|c| Value::Array(c.to_vec()))
            .collect(),
    )))
}

/// `$range(start, end, step)` — inclusive of `end`; a single-element result
/// collapses to the scalar. Shares the 1000-element guard with
/// `States.ArrayRange`.
fn range(args: Vec<Option<Value>>) -> FnResult {
    let start = require_number("range", arg(&args, 0))?;
    let end = require_number("range", arg(&args, 1))?;
    let step = match arg(&args, 2) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| type_error("range", "a numeric step"))?,
        None => 1.0,
    };
    if step == 0.0 {
        return Err(StatesError::runtime("$range step cannot be 0"));
    }
    let count = ((end - start) / step).floor();
    if count < 0.0 {
        return Ok(None);
    }
    if count + 1.0 > 1000.0 {
        return Err(StatesError::runtime(
            "$range cannot produce more than 1000 elements",
        ));
    }
    let mut out = Vec::new();
    let mut v = start;
    while (step > 0.0 && v <= end) || (step < 0.0 && v >= end) {
        out.push(num_value(v));
        v += step;
    }
    match out.len() {
        0 => Ok(None),
        1 => Ok(Some(out.remove(0))),
        _ => Ok(Some(Value::Array(out))),
    }
}

fn hash(args: Vec<Option<Value>>) -> FnResult {
    let Some(data) = arg(&args, 0) else {
        return Ok(None);
    };
    let data = match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    let algorithm = match arg(&args, 1) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(type_error("hash", "a string algorithm name")),
        None => "SHA-256".to_string(),
    };
    hash_hex(&algorithm, &data)
        .map(|digest| Some(Value::String(digest)))
        .map_err(StatesError::runtime)
}

fn random(args: Vec<Option<Value>>) -> FnResult {
    let fraction = match arg(&args, 0) {
        Some(seed) => seeded_fraction(require_number("random", Some(seed))?),
        None => rand::random::<f64>(),
    };
    Ok(Some(num_value(fraction)))
}

fn parse(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::String(s)) = arg(&args, 0) else {
        return Err(type_error("parse", "a JSON string"));
    };
    serde_json::from_str(s)
        .map(Some)
        .map_err(|e| StatesError::runtime(format!("$parse: invalid JSON: {e}")))
}

fn number(args: Vec<Option<Value>>) -> FnResult {
    match arg(&args, 0) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(Value::Number(n.clone()))),
        Some(Value::Bool(b)) => Ok(Some(json!(if *b { 1 } else { 0 }))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| Some(num_value(f)))
            .map_err(|_| StatesError::runtime(format!("$number: cannot cast '{s}' to a number"))),
        Some(_) => Err(type_error("number", "a number, boolean, or numeric string")),
    }
}

fn collect_numbers(name: &str, v: Option<&Value>) -> Result<Vec<f64>, StatesError> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| i.as_f64().ok_or_else(|| type_error(name, "numbers")))
            .collect(),
        Some(single) => Ok(vec![
            single.as_f64().ok_or_else(|| type_error(name, "numbers"))?,
        ]),
        None => Ok(Vec::new()),
    }
}

fn fold_numbers(
    name: &str,
    args: Vec<Option<Value>>,
    fold: impl Fn(&[f64]) -> f64,
) -> FnResult {
    let nums = collect_numbers(name, arg(&args, 0))?;
    if nums.is_empty() {
        return Ok(None);
    }
    Ok(Some(num_value(fold(&nums))))
}

fn map_number(name: &str, args: Vec<Option<Value>>, f: impl Fn(f64) -> f64) -> FnResult {
    match arg(&args, 0) {
        None => Ok(None),
        v => Ok(Some(num_value(f(require_number(name, v)?)))),
    }
}

fn power(args: Vec<Option<Value>>) -> FnResult {
    match arg(&args, 0) {
        None => Ok(None),
        base => {
            let base = require_number("power", base)?;
            let exp = require_number("power", arg(&args, 1))?;
            Ok(Some(num_value(base.powf(exp))))
        }
    }
}

fn map_string(name: &str, args: Vec<Option<Value>>, f: impl Fn(&str) -> String) -> FnResult {
    match arg(&args, 0) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(Value::String(f(s)))),
        Some(_) => Err(type_error(name, "a string")),
    }
}

/// `$substring(str, start[, length])` with negative `start` counting from
/// the end.
fn substring(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::String(s)) = arg(&args, 0) else {
        return Ok(None);
    };
    let chars: Vec<char> = s.chars().collect();
    let start = require_number("substring", arg(&args, 1))? as i64;
    let start = if start < 0 {
        (chars.len() as i64 + start).max(0) as usize
    } else {
        (start as usize).min(chars.len())
    };
    let end = match arg(&args, 2) {
        Some(v) => {
            let len = require_number("substring", Some(v))?.max(0.0) as usize;
            (start + len).min(chars.len())
        }
        None => chars.len(),
    };
    Ok(Some(Value::String(chars[start..end].iter().collect())))
}

fn contains(args: Vec<Option<Value>>) -> FnResult {
    let (Some(Value::String(s)), Some(Value::String(needle))) = (arg(&args, 0), arg(&args, 1))
    else {
        return Ok(Some(Value::Bool(false)));
    };
    Ok(Some(Value::Bool(s.contains(needle.as_str()))))
}

fn split(args: Vec<Option<Value>>) -> FnResult {
    let (Some(Value::String(s)), Some(Value::String(sep))) = (arg(&args, 0), arg(&args, 1)) else {
        return Ok(None);
    };
    Ok(Some(Value::Array(
        s.split(sep.as_str())
            .map(|p| Value::String(p.to_string()))
            .collect(),
    )))
}

fn join(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::Array(items)) = arg(&args, 0) else {
        return match arg(&args, 0) {
            Some(Value::String(s)) => Ok(Some(Value::String(s.clone()))),
            _ => Ok(None),
        };
    };
    let sep = match arg(&args, 1) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    let parts: Vec<String> = items.iter().map(to_string_repr).collect();
    Ok(Some(Value::String(parts.join(&sep))))
}

fn replace(args: Vec<Option<Value>>) -> FnResult {
    let (Some(Value::String(s)), Some(Value::String(from)), Some(Value::String(to))) =
        (arg(&args, 0), arg(&args, 1), arg(&args, 2))
    else {
        return Ok(None);
    };
    Ok(Some(Value::String(s.replace(from.as_str(), to.as_str()))))
}

fn append(args: Vec<Option<Value>>) -> FnResult {
    let to_items = |v: Option<&Value>| -> Vec<Value> {
        match v {
            None => Vec::new(),
            Some(Value::Array(a)) => a.clone(),
            Some(single) => vec![single.clone()],
        }
    };
    let mut out = to_items(arg(&args, 0));
    out.extend(to_items(arg(&args, 1)));
    if out.is_empty() {
        return Ok(None);
    }
    Ok(Some(Value::Array(out)))
}

fn merge(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::Array(items)) = arg(&args, 0) else {
        return match arg(&args, 0) {
            Some(Value::Object(o)) => Ok(Some(Value::Object(o.clone()))),
            _ => Ok(None),
        };
    };
    let mut out = Map::new();
    for item in items {
        let Value::Object(o) = item else {
            return Err(type_error("merge", "an array of objects"));
        };
        for (k, v) in o {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Some(Value::Object(out)))
}

fn distinct(args: Vec<Option<Value>>) -> FnResult {
    let Some(Value::Array(items)) = arg(&args, 0) else {
        return Ok(arg(&args, 0).cloned());
    };
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out
            .iter()
            .any(|u| crate::utils::json_ext::values_equal(u, item))
        {
            out.push(item.clone());
        }
    }
    Ok(Some(Value::Array(out)))
}
