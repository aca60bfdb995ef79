//! JSON manipulation utilities for the stepbench interpreter.
//!
//! Provides the dotted-path get/set used by `ResultPath` merging, the
//! shallow merge behind `States.JsonMerge`, and the deep structural subset
//! matcher shared by conditional mocks and runner expectations.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during JSON path operations.
#[derive(Debug, Error, Diagnostic)]
pub enum JsonError {
    /// A reference path that cannot be applied to the target value.
    #[error("Invalid reference path: {path}")]
    #[diagnostic(code(stepbench::json::invalid_path))]
    InvalidPath { path: String },
}

/// Get a human-readable type name for a JSON value.
#[must_use]
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split a `$.a.b` style reference path into its segments.
///
/// Accepts both dotted segments and bracketed string segments
/// (`$.a['b c']`). The leading `$` (or `$.`) is consumed.
pub fn path_segments(path: &str) -> Result<Vec<String>, JsonError> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| JsonError::InvalidPath {
            path: path.to_string(),
        })?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();
    let mut current = String::new();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut seg = String::new();
                let quoted = matches!(chars.peek(), Some('\'') | Some('"'));
                let quote = if quoted { chars.next() } else { None };
                loop {
                    match chars.next() {
                        Some(']') if !quoted => break,
                        Some(c2) if quoted && Some(c2) == quote => {
                            // consume the closing bracket
                            if chars.next() != Some(']') {
                                return Err(JsonError::InvalidPath {
                                    path: path.to_string(),
                                });
                            }
                            break;
                        }
                        Some(c2) => seg.push(c2),
                        None => {
                            return Err(JsonError::InvalidPath {
                                path: path.to_string(),
                            });
                        }
                    }
                }
                segments.push(seg);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}

/// Get a value by `$.a.b` reference path.
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = path_segments(path).ok()?;
    let mut current = value;
    for seg in &segments {
        match current {
            Value::Object(obj) => current = obj.get(seg)?,
            Value::Array(arr) => {
                let index: usize = seg.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Set a value at a `$.a.b` reference path, creating intermediate objects.
///
/// This is the merge primitive behind `ResultPath`: the target is a deep
/// clone of the state's raw input and the task result is grafted in at the
/// referenced location.
pub fn set_by_path(target: &mut Value, path: &str, value: Value) -> Result<(), JsonError> {
    let segments = path_segments(path)?;
    if segments.is_empty() {
        *target = value;
        return Ok(());
    }
    if !target.is_object() {
        // Grafting into a non-object replaces it with a fresh object root.
        *target = Value::Object(Map::new());
    }
    let mut current = target;
    for seg in &segments[..segments.len() - 1] {
        match current {
            Value::Object(obj) => {
                let slot = obj
                    .entry(seg.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                current = slot;
            }
            _ => {
                return Err(JsonError::InvalidPath {
                    path: path.to_string(),
                });
            }
        }
    }
    match current {
        Value::Object(obj) => {
            obj.insert(segments[segments.len() - 1].clone(), value);
            Ok(())
        }
        _ => Err(JsonError::InvalidPath {
            path: path.to_string(),
        }),
    }
}

/// Shallow merge of two objects: keys from `right` win.
///
/// This is `States.JsonMerge` with `deep=false` (the only supported form).
#[must_use]
pub fn shallow_merge(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut out = l.clone();
            for (k, v) in r {
                out.insert(k.clone(), v.clone());
            }
            Some(Value::Object(out))
        }
        _ => None,
    }
}

/// Numeric-aware equality: `1` and `1.0` compare equal, everything else is
/// structural.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xf), Some(yf)) => xf == yf,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(xv, yv)| values_equal(xv, yv))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, xv)| y.get(k).is_some_and(|yv| values_equal(xv, yv)))
        }
        _ => a == b,
    }
}

/// Deep structural subset: every key of `expected` must be present in
/// `actual` at each level with a matching value; arrays match element-wise
/// as a prefix-wise subset.
///
/// Shared by conditional-mock `when` matching and runner expectations.
#[must_use]
pub fn is_deep_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => e
            .iter()
            .all(|(k, ev)| a.get(k).is_some_and(|av| is_deep_subset(ev, av))),
        (Value::Array(e), Value::Array(a)) => {
            e.len() <= a.len() && e.iter().zip(a).all(|(ev, av)| is_deep_subset(ev, av))
        }
        _ => values_equal(expected, actual),
    }
}
