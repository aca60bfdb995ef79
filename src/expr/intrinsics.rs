//! The `States.*` intrinsic function family (JSONPath mode only).
//!
//! Intrinsic expressions appear as string values in payload templates and
//! `Assign` blocks. Argument lists are split with awareness of nested
//! parentheses, brackets, braces, and quoted strings; arguments that start
//! with `$` are path references evaluated against the scope, nested
//! `States.*` calls are evaluated recursively, and anything else is parsed
//! as a JSON literal (single-quoted strings are unquoted).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Md5;
use serde_json::{Number, Value, json};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::errors::StatesError;
use crate::expr::jsonpath::{self, EvalScope};
use crate::expr::num_value;

/// Whether a template string should be treated as an intrinsic call.
#[must_use]
pub fn contains_intrinsic(s: &str) -> bool {
    s.contains("States.")
}

/// Evaluate a full intrinsic expression, e.g.
/// `States.Format('hello {}', $.name)`.
pub fn evaluate(expr: &str, scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    let expr = expr.trim();
    let open = expr
        .find('(')
        .ok_or_else(|| StatesError::runtime(format!("Invalid intrinsic expression: {expr}")))?;
    if !expr.ends_with(')') || !expr.starts_with("States.") {
        return Err(StatesError::runtime(format!(
            "Invalid intrinsic expression: {expr}"
        )));
    }
    let name = &expr[..open];
    let inner = &expr[open + 1..expr.len() - 1];
    let args = split_arguments(inner)
        .into_iter()
        .map(|arg| evaluate_argument(&arg, scope))
        .collect::<Result<Vec<_>, _>>()?;
    apply(name, args, scope)
}

fn evaluate_argument(arg: &str, scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    if arg.starts_with("States.") {
        return evaluate(arg, scope);
    }
    if arg.starts_with('$') {
        return jsonpath::evaluate(arg, scope);
    }
    if arg.len() >= 2 && arg.starts_with('\'') && arg.ends_with('\'') {
        let inner = &arg[1..arg.len() - 1];
        return Ok(Value::String(inner.replace("\\'", "'")));
    }
    match serde_json::from_str::<Value>(arg) {
        Ok(v) => Ok(v),
        Err(_) => Ok(Value::String(arg.to_string())),
    }
}

/// Split an intrinsic argument list on top-level commas.
fn split_arguments(inner: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => {
                    args.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let last = current.trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last.to_string());
    }
    args.retain(|a| !a.is_empty());
    args
}

fn apply(name: &str, args: Vec<Value>, _scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    match name {
        "States.Array" => Ok(Value::Array(args)),
        "States.ArrayPartition" => array_partition(args),
        "States.ArrayContains" => array_contains(args),
        "States.ArrayRange" => array_range(args),
        "States.ArrayGetItem" => array_get_item(args),
        "States.ArrayLength" => {
            let [arr] = take_args::<1>(name, args)?;
            Ok(json!(as_array(name, &arr)?.len()))
        }
        "States.ArrayUnique" => {
            let [arr] = take_args::<1>(name, args)?;
            let items = as_array(name, &arr)?;
            let mut unique: Vec<Value> = Vec::new();
            for item in items {
                if !unique
                    .iter()
                    .any(|u| crate::utils::json_ext::values_equal(u, item))
                {
                    unique.push(item.clone());
                }
            }
            Ok(Value::Array(unique))
        }
        "States.Base64Encode" => {
            let [v] = take_args::<1>(name, args)?;
            Ok(Value::String(BASE64.encode(as_str(name, &v)?)))
        }
        "States.Base64Decode" => {
            let [v] = take_args::<1>(name, args)?;
            let bytes = BASE64
                .decode(as_str(name, &v)?)
                .map_err(|e| StatesError::runtime(format!("{name}: invalid base64: {e}")))?;
            let s = String::from_utf8(bytes)
                .map_err(|_| StatesError::runtime(format!("{name}: decoded data is not UTF-8")))?;
            Ok(Value::String(s))
        }
        "States.Hash" => states_hash(args),
        "States.JsonMerge" => json_merge(args),
        "States.StringToJson" => {
            let [v] = take_args::<1>(name, args)?;
            serde_json::from_str(as_str(name, &v)?)
                .map_err(|e| StatesError::runtime(format!("{name}: invalid JSON: {e}")))
        }
        "States.JsonToString" => {
            let [v] = take_args::<1>(name, args)?;
            Ok(Value::String(serde_json::to_string(&v).unwrap_or_default()))
        }
        "States.MathRandom" => math_random(args),
        "States.MathAdd" => math_add(args),
        "States.StringSplit" => string_split(args),
        "States.Format" => states_format(args),
        "States.UUID" => {
            if !args.is_empty() {
                return Err(StatesError::runtime("States.UUID takes no arguments"));
            }
            Ok(Value::String(uuid::Uuid::new_v4().to_string()))
        }
        other => Err(StatesError::runtime(format!(
            "Unknown intrinsic function: {other}"
        ))),
    }
}

fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], StatesError> {
    let len = args.len();
    args.try_into().map_err(|_| {
        StatesError::runtime(format!("{name} expects {N} argument(s), got {len}"))
    })
}

fn as_array<'a>(name: &str, v: &'a Value) -> Result<&'a Vec<Value>, StatesError> {
    v.as_array()
        .ok_or_else(|| StatesError::runtime(format!("{name} expects an array argument")))
}

fn as_str<'a>(name: &str, v: &'a Value) -> Result<&'a str, StatesError> {
    v.as_str()
        .ok_or_else(|| StatesError::runtime(format!("{name} expects a string argument")))
}

fn as_f64(name: &str, v: &Value) -> Result<f64, StatesError> {
    v.as_f64()
        .ok_or_else(|| StatesError::runtime(format!("{name} expects a numeric argument")))
}

fn as_i64(name: &str, v: &Value) -> Result<i64, StatesError> {
    let f = as_f64(name, v)?;
    if f.fract() != 0.0 {
        return Err(StatesError::runtime(format!(
            "{name} expects an integer argument"
        )));
    }
    Ok(f as i64)
}

fn array_partition(args: Vec<Value>) -> Result<Value, StatesError> {
    let [arr, size] = take_args::<2>("States.ArrayPartition", args)?;
    let items = as_array("States.ArrayPartition", &arr)?;
    let size = as_i64("States.ArrayPartition", &size)?;
    if size <= 0 {
        return Err(StatesError::runtime(
            "States.ArrayPartition chunk size must be positive",
        ));
    }
    let chunks = items
        .chunks(size as usize)
        .map(|c| Value::Array(c.to_vec()))
        .collect();
    Ok(Value::Array(chunks))
}

fn array_contains(args: Vec<Value>) -> Result<Value, StatesError> {
    let [arr, needle] = take_args::<2>("States.ArrayContains", args)?;
    let items = as_array("States.ArrayContains", &arr)?;
    Ok(Value::Bool(items.iter().any(|item| {
        crate::utils::json_ext::values_equal(item, &needle)
    })))
}

/// Inclusive range. Refuses to materialize more than 1000 elements.
fn array_range(args: Vec<Value>) -> Result<Value, StatesError> {
    let [start, end, step] = take_args::<3>("States.ArrayRange", args)?;
    let start = as_f64("States.ArrayRange", &start)?;
    let end = as_f64("States.ArrayRange", &end)?;
    let step = as_f64("States.ArrayRange", &step)?;
    if step == 0.0 {
        return Err(StatesError::runtime("States.ArrayRange step cannot be 0"));
    }
    let count = ((end - start) / step).floor();
    if count < 0.0 {
        return Ok(Value::Array(Vec::new()));
    }
    if count + 1.0 > 1000.0 {
        return Err(StatesError::runtime(
            "States.ArrayRange cannot produce more than 1000 elements",
        ));
    }
    let mut out = Vec::new();
    let mut v = start;
    while (step > 0.0 && v <= end) || (step < 0.0 && v >= end) {
        out.push(num_value(v));
        v += step;
    }
    Ok(Value::Array(out))
}

/// The index is rounded to the nearest integer and must be in range.
fn array_get_item(args: Vec<Value>) -> Result<Value, StatesError> {
    let [arr, index] = take_args::<2>("States.ArrayGetItem", args)?;
    let items = as_array("States.ArrayGetItem", &arr)?;
    let index = as_f64("States.ArrayGetItem", &index)?.round();
    if index < 0.0 || index as usize >= items.len() {
        return Err(StatesError::runtime(format!(
            "States.ArrayGetItem index {index} is out of range for array of length {}",
            items.len()
        )));
    }
    Ok(items[index as usize].clone())
}

/// Hex digest of a string. Defaults to SHA-256.
pub(crate) fn hash_hex(algorithm: &str, data: &str) -> Result<String, String> {
    let digest = match algorithm {
        "MD5" => hex::encode(Md5::digest(data.as_bytes())),
        "SHA-1" => hex::encode(Sha1::digest(data.as_bytes())),
        "SHA-256" => hex::encode(Sha256::digest(data.as_bytes())),
        "SHA-384" => hex::encode(Sha384::digest(data.as_bytes())),
        "SHA-512" => hex::encode(Sha512::digest(data.as_bytes())),
        other => return Err(format!("Unsupported hash algorithm: {other}")),
    };
    Ok(digest)
}

fn states_hash(mut args: Vec<Value>) -> Result<Value, StatesError> {
    if args.is_empty() || args.len() > 2 {
        return Err(StatesError::runtime(
            "States.Hash expects 1 or 2 argument(s)",
        ));
    }
    let algorithm = if args.len() == 2 {
        match args.pop() {
            Some(Value::String(s)) => s,
            _ => {
                return Err(StatesError::runtime(
                    "States.Hash algorithm must be a string",
                ));
            }
        }
    } else {
        "SHA-256".to_string()
    };
    let data = match &args[0] {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    hash_hex(&algorithm, &data)
        .map(Value::String)
        .map_err(StatesError::runtime)
}

/// Shallow merge only: the `deep` flag must be the literal `false`.
fn json_merge(args: Vec<Value>) -> Result<Value, StatesError> {
    let [a, b, deep] = take_args::<3>("States.JsonMerge", args)?;
    if deep != Value::Bool(false) {
        return Err(StatesError::runtime(
            "States.JsonMerge deep merge is not supported; the third argument must be false",
        ));
    }
    crate::utils::json_ext::shallow_merge(&a, &b)
        .ok_or_else(|| StatesError::runtime("States.JsonMerge expects two object arguments"))
}

/// Deterministic fraction in [0, 1) derived from a seed. Local-only
/// determinism; not an AWS-specified sequence.
pub(crate) fn seeded_fraction(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    x - x.floor()
}

fn math_random(args: Vec<Value>) -> Result<Value, StatesError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(StatesError::runtime(
            "States.MathRandom expects 2 or 3 argument(s)",
        ));
    }
    let start = as_i64("States.MathRandom", &args[0])?;
    let end = as_i64("States.MathRandom", &args[1])?;
    if end <= start {
        return Err(StatesError::runtime(
            "States.MathRandom requires end > start",
        ));
    }
    let fraction = match args.get(2) {
        Some(seed) => seeded_fraction(as_f64("States.MathRandom", seed)?),
        None => rand::random::<f64>(),
    };
    let value = start + (fraction * (end - start) as f64).floor() as i64;
    Ok(Value::Number(Number::from(value)))
}

/// Integer addition bounded to the int32 range.
fn math_add(args: Vec<Value>) -> Result<Value, StatesError> {
    let [a, b] = take_args::<2>("States.MathAdd", args)?;
    let sum = as_i64("States.MathAdd", &a)? + as_i64("States.MathAdd", &b)?;
    if sum < i64::from(i32::MIN) || sum > i64::from(i32::MAX) {
        return Err(StatesError::runtime(
            "States.MathAdd result is outside the int32 range",
        ));
    }
    Ok(Value::Number(Number::from(sum)))
}

/// Multi-character delimiters that repeat a single character (e.g. `"::"`)
/// split on the whole delimiter; any other delimiter is treated as a
/// character class.
fn string_split(args: Vec<Value>) -> Result<Value, StatesError> {
    let [s, delim] = take_args::<2>("States.StringSplit", args)?;
    let s = as_str("States.StringSplit", &s)?;
    let delim = as_str("States.StringSplit", &delim)?;
    if delim.is_empty() {
        return Err(StatesError::runtime(
            "States.StringSplit delimiter cannot be empty",
        ));
    }
    let uniform = delim.chars().all(|c| Some(c) == delim.chars().next());
    let parts: Vec<&str> = if delim.chars().count() > 1 && uniform {
        s.split(delim).collect()
    } else {
        s.split(|c: char| delim.contains(c)).collect()
    };
    Ok(Value::Array(
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| Value::String(p.to_string()))
            .collect(),
    ))
}

/// `{}` placeholders are substituted left to right.
fn states_format(args: Vec<Value>) -> Result<Value, StatesError> {
    if args.is_empty() {
        return Err(StatesError::runtime(
            "States.Format expects a template argument",
        ));
    }
    let mut args = args.into_iter();
    let template = match args.next() {
        Some(Value::String(s)) => s,
        _ => {
            return Err(StatesError::runtime(
                "States.Format template must be a string",
            ));
        }
    };
    let values: Vec<Value> = args.collect();
    let placeholders = template.matches("{}").count();
    if placeholders != values.len() {
        return Err(StatesError::runtime(format!(
            "States.Format template has {placeholders} placeholder(s) but {} argument(s) were given",
            values.len()
        )));
    }
    let mut out = template;
    for value in values {
        let rendered = match value {
            Value::String(s) => s,
            other => serde_json::to_string(&other).unwrap_or_default(),
        };
        out = out.replacen("{}", &rendered, 1);
    }
    Ok(Value::String(out))
}
