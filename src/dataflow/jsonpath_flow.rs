//! JSONPath-mode data flow.
//!
//! Pipeline: `InputPath` → `Parameters` → (task) → `ResultSelector` →
//! `ResultPath` → `OutputPath` → `Assign`. Map states skip `Parameters`
//! here; it is applied per item inside the iteration as `ItemSelector`'s
//! legacy spelling.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::asl::{CatchRule, PathValue, State};
use crate::errors::StatesError;
use crate::expr::intrinsics;
use crate::expr::jsonpath::{self, EvalScope};
use crate::utils::json_ext;

use super::{DataFlow, Postprocessed};

pub(crate) struct JsonPathFlow;

impl DataFlow for JsonPathFlow {
    fn preprocess(
        &self,
        state: &State,
        input: &Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Value, StatesError> {
        let common = state.common();
        let scope = EvalScope::new(input, context_object, variables);
        let mut data = apply_input_path(common.input_path.as_ref(), input, &scope)?;
        if !matches!(state, State::Map(_)) {
            if let Some(template) = &common.parameters {
                let scope = scope.with_data(&data);
                data = expand_payload_template(template, &scope)?;
            }
        }
        Ok(data)
    }

    fn postprocess(
        &self,
        state: &State,
        raw_input: &Value,
        _effective_input: &Value,
        result: Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Postprocessed, StatesError> {
        let common = state.common();
        let selected = match &common.result_selector {
            Some(template) => {
                let scope = EvalScope::new(&result, context_object, variables);
                expand_payload_template(template, &scope)?
            }
            None => result,
        };

        let merged = match &common.result_path {
            None => selected.clone(),
            Some(PathValue::Null) => raw_input.clone(),
            Some(PathValue::Path(p)) if p == "$" => selected.clone(),
            Some(PathValue::Path(p)) => {
                let mut base = raw_input.clone();
                json_ext::set_by_path(&mut base, p, selected.clone())
                    .map_err(|e| StatesError::runtime(e.to_string()))?;
                base
            }
        };

        let output = {
            let scope = EvalScope::new(&merged, context_object, variables);
            match &common.output_path {
                None => merged.clone(),
                Some(PathValue::Null) => Value::Null,
                Some(PathValue::Path(p)) if p == "$" => merged.clone(),
                Some(PathValue::Path(p)) => jsonpath::evaluate(p, &scope)?,
            }
        };

        // Assign reads the ResultSelector output and the pre-assign
        // variable snapshot.
        let assignments = match &common.assign {
            Some(template) => {
                let scope = EvalScope::new(&selected, context_object, variables);
                expand_assignments(template, &scope)?
            }
            None => FxHashMap::default(),
        };

        Ok(Postprocessed {
            output,
            assignments,
        })
    }

    fn catch_output(
        &self,
        rule: &CatchRule,
        raw_input: &Value,
        error: &StatesError,
        _variables: &FxHashMap<String, Value>,
        _context_object: &Value,
    ) -> Result<Value, StatesError> {
        let payload = error.to_payload();
        match &rule.result_path {
            None => Ok(payload),
            Some(PathValue::Null) => Ok(raw_input.clone()),
            Some(PathValue::Path(p)) if p == "$" => Ok(payload),
            Some(PathValue::Path(p)) => {
                let mut base = raw_input.clone();
                json_ext::set_by_path(&mut base, p, payload)
                    .map_err(|e| StatesError::runtime(e.to_string()))?;
                Ok(base)
            }
        }
    }
}

fn apply_input_path(
    input_path: Option<&PathValue>,
    input: &Value,
    scope: &EvalScope<'_>,
) -> Result<Value, StatesError> {
    match input_path {
        None => Ok(input.clone()),
        Some(PathValue::Null) => Ok(Value::Null),
        Some(PathValue::Path(p)) if p == "$" => Ok(input.clone()),
        Some(PathValue::Path(p)) => jsonpath::evaluate(p, scope),
    }
}

/// Expand a payload template (`Parameters`, `ResultSelector`,
/// `ItemSelector`): keys ending in `.$` evaluate their string value as an
/// intrinsic call, context reference, variable reference, or JSONPath;
/// nested objects and arrays recurse.
pub(crate) fn expand_payload_template(
    template: &Value,
    scope: &EvalScope<'_>,
) -> Result<Value, StatesError> {
    match template {
        Value::Object(entries) => {
            let mut out = serde_json::Map::new();
            for (key, value) in entries {
                if let Some(bare) = key.strip_suffix(".$") {
                    let expr = value.as_str().ok_or_else(|| {
                        StatesError::runtime(format!(
                            "The value for the field '{key}' must be a string expression"
                        ))
                    })?;
                    out.insert(bare.to_string(), evaluate_template_expr(expr, scope)?);
                } else {
                    out.insert(key.clone(), expand_payload_template(value, scope)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| expand_payload_template(item, scope))
                .collect::<Result<_, _>>()?,
        )),
        other => Ok(other.clone()),
    }
}

/// Evaluate one `.$` expression. Intrinsic calls are recognized first;
/// everything else goes through the path evaluator, which dispatches
/// context (`$$`) and variable (`$name`) references itself.
fn evaluate_template_expr(expr: &str, scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    if intrinsics::contains_intrinsic(expr) {
        intrinsics::evaluate(expr, scope)
    } else {
        jsonpath::evaluate(expr, scope)
    }
}

/// Expand an `Assign` block into the variable updates it produces.
pub(crate) fn expand_assignments(
    template: &Value,
    scope: &EvalScope<'_>,
) -> Result<FxHashMap<String, Value>, StatesError> {
    let expanded = expand_payload_template(template, scope)?;
    let Value::Object(entries) = expanded else {
        return Err(StatesError::runtime("Assign must be an object"));
    };
    Ok(entries.into_iter().collect())
}
