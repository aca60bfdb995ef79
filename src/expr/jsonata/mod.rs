//! JSONata expression engine with the Step Functions extensions.
//!
//! ASL embeds JSONata expressions as strings wrapped in `{% … %}`. The
//! engine evaluates the subset the States Language exercises: path
//! navigation with implicit array mapping, predicates and indexing,
//! arithmetic, string concatenation, comparisons, boolean operators, the
//! conditional operator, array/object constructors, a function library,
//! and the Step Functions extensions `$partition`, `$range`, `$hash`,
//! `$random`, `$uuid`, and `$parse`.
//!
//! Expressions see the reserved `$states` binding plus every workflow
//! variable as `$name`. Evaluation failures surface as `States.Runtime`
//! error values.

mod eval;
mod functions;
mod lexer;
mod parser;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::errors::StatesError;

/// Variable bindings visible to an expression: the reserved `$states`
/// object plus the workflow variable store.
#[derive(Clone, Debug)]
pub struct JsonataScope {
    bindings: FxHashMap<String, Value>,
}

impl JsonataScope {
    pub fn new(states: Value, variables: &FxHashMap<String, Value>) -> Self {
        let mut bindings = variables.clone();
        bindings.insert("states".to_string(), states);
        Self { bindings }
    }
}

/// Whether a string carries an embedded JSONata expression.
#[must_use]
pub fn is_expression(s: &str) -> bool {
    s.contains("{%")
}

/// Whether a string is one fully wrapped `{% … %}` expression.
#[must_use]
pub fn is_wrapped(s: &str) -> bool {
    let t = s.trim();
    t.starts_with("{%") && t.ends_with("%}") && t.len() >= 4 && {
        // The first closer must be the terminal one, otherwise the string
        // merely contains an expression.
        t.find("%}").is_some_and(|i| i == t.len() - 2)
    }
}

fn strip_wrapper(s: &str) -> &str {
    let t = s.trim();
    t[2..t.len() - 2].trim()
}

/// JavaScript `Boolean(value)` truthiness, applied to Choice conditions
/// and boolean operators. This intentionally diverges from AWS, which
/// raises a type error for non-boolean conditions: `false`, `null`,
/// undefined, `0`, `""`, and `NaN` are false; everything else (including
/// `[]` and `{}`) is true.
#[must_use]
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Evaluate a bare expression (no `{% %}` wrapper). `None` is JSONata's
/// `undefined`.
pub fn evaluate_expression(
    src: &str,
    scope: &JsonataScope,
) -> Result<Option<Value>, StatesError> {
    let ast = parser::parse(src)
        .map_err(|e| StatesError::runtime(format!("JSONata expression error: {e}")))?;
    let env = eval::Env {
        bindings: &scope.bindings,
        root: None,
    };
    eval::eval(&ast, None, &env)
}

/// Evaluate a string field: fully wrapped strings yield the expression
/// value, strings merely containing `{% … %}` are interpolated, and plain
/// strings pass through.
pub fn evaluate_string(s: &str, scope: &JsonataScope) -> Result<Option<Value>, StatesError> {
    if is_wrapped(s) {
        return evaluate_expression(strip_wrapper(s), scope);
    }
    if !is_expression(s) {
        return Ok(Some(Value::String(s.to_string())));
    }
    let mut out = String::new();
    let mut rest = s;
    while let Some(open) = rest.find("{%") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find("%}").ok_or_else(|| {
            StatesError::runtime("JSONata expression error: unterminated {% %} block")
        })?;
        let value = evaluate_expression(after[..close].trim(), scope)?;
        if let Some(v) = value {
            out.push_str(&eval::to_string_repr(&v));
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(Some(Value::String(out)))
}

/// Recursively evaluate a template value: every string is passed through
/// [`evaluate_string`]; object entries and array elements whose expression
/// evaluates to `undefined` are omitted.
pub fn evaluate_template(template: &Value, scope: &JsonataScope) -> Result<Value, StatesError> {
    match template {
        Value::String(s) => Ok(evaluate_string(s, scope)?.unwrap_or(Value::Null)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => {
                        if let Some(v) = evaluate_string(s, scope)? {
                            out.push(v);
                        }
                    }
                    other => out.push(evaluate_template(other, scope)?),
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(entries) => {
            let mut out = serde_json::Map::new();
            for (key, value) in entries {
                match value {
                    Value::String(s) => {
                        if let Some(v) = evaluate_string(s, scope)? {
                            out.insert(key.clone(), v);
                        }
                    }
                    other => {
                        out.insert(key.clone(), evaluate_template(other, scope)?);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
