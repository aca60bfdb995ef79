//! ASL-flavored JSONPath evaluation.
//!
//! A reference string is dispatched by shape before any path machinery
//! runs: `$$…` reads the execution context object, `$name…` reads the
//! variable store (when a variable of that name exists), and everything
//! else is evaluated against the current data with [`jsonpath_lib`].
//!
//! Definite paths (no wildcard, recursive descent, filter, union, or
//! slice) yield the single referenced value and error when it is absent;
//! indefinite paths yield an array of every match.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::errors::StatesError;

/// Everything a path reference can see: the current data (`$`), the
/// execution context object (`$$`), and the variable store (`$name`).
#[derive(Clone, Copy, Debug)]
pub struct EvalScope<'a> {
    pub data: &'a Value,
    pub context: &'a Value,
    pub variables: &'a FxHashMap<String, Value>,
}

impl<'a> EvalScope<'a> {
    pub fn new(
        data: &'a Value,
        context: &'a Value,
        variables: &'a FxHashMap<String, Value>,
    ) -> Self {
        Self {
            data,
            context,
            variables,
        }
    }

    /// Same scope, different data cursor.
    #[must_use]
    pub fn with_data(&self, data: &'a Value) -> Self {
        Self { data, ..*self }
    }
}

/// Split `$name.rest` into the variable name and the remainder path.
///
/// Returns `None` when the reference is not variable-shaped (e.g. `$.a`,
/// `$$`, or a bare `$`).
#[must_use]
pub fn split_variable_ref(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('$')?;
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(rest.len(), |(i, _)| i);
    let (name, remainder) = rest.split_at(end);
    if remainder.is_empty() || remainder.starts_with('.') || remainder.starts_with('[') {
        Some((name, remainder))
    } else {
        None
    }
}

/// Evaluate a path reference against the scope.
pub fn evaluate(path: &str, scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    if path == "$" {
        return Ok(scope.data.clone());
    }
    if path == "$$" {
        return Ok(scope.context.clone());
    }
    if let Some(rest) = path.strip_prefix("$$") {
        let rewritten = format!("${rest}");
        return select(scope.context, &rewritten, path);
    }
    if let Some((name, rest)) = split_variable_ref(path) {
        if let Some(value) = scope.variables.get(name) {
            if rest.is_empty() {
                return Ok(value.clone());
            }
            let rewritten = format!("${rest}");
            return select(value, &rewritten, path);
        }
    }
    select(scope.data, path, path)
}

/// Whether a path reference resolves to an existing value. Used by the
/// `IsPresent` comparator, which must not error on absence.
#[must_use]
pub fn exists(path: &str, scope: &EvalScope<'_>) -> bool {
    if path == "$" || path == "$$" {
        return true;
    }
    if let Some(rest) = path.strip_prefix("$$") {
        let rewritten = format!("${rest}");
        return matches!(jsonpath_lib::select(scope.context, &rewritten), Ok(v) if !v.is_empty());
    }
    if let Some((name, rest)) = split_variable_ref(path) {
        return match scope.variables.get(name) {
            Some(value) if !rest.is_empty() => {
                let rewritten = format!("${rest}");
                matches!(jsonpath_lib::select(value, &rewritten), Ok(v) if !v.is_empty())
            }
            Some(_) => true,
            None => false,
        };
    }
    matches!(jsonpath_lib::select(scope.data, path), Ok(v) if !v.is_empty())
}

/// Run a concrete selection, collapsing definite paths to their single
/// value and erroring when a definite path has no match.
fn select(root: &Value, path: &str, original: &str) -> Result<Value, StatesError> {
    let found = jsonpath_lib::select(root, path)
        .map_err(|e| StatesError::invalid_path(original, &format!("{e:?}")))?;
    if is_definite(path) {
        match found.first() {
            Some(v) => Ok((*v).clone()),
            None => Err(StatesError::invalid_path(
                original,
                "No value found at the referenced path",
            )),
        }
    } else {
        Ok(Value::Array(found.into_iter().cloned().collect()))
    }
}

/// A definite path selects at most one value: no wildcards, recursive
/// descent, filters, unions, or slices.
#[must_use]
fn is_definite(path: &str) -> bool {
    if path.contains('*') || path.contains("..") || path.contains("[?") {
        return false;
    }
    let mut in_quote: Option<char> = None;
    let mut in_bracket = false;
    for c in path.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => in_quote = Some(c),
                '[' => in_bracket = true,
                ']' => in_bracket = false,
                ':' | ',' if in_bracket => return false,
                _ => {}
            },
        }
    }
    true
}
