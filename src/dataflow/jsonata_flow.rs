//! JSONata-mode data flow.
//!
//! `Arguments` shapes the effective input, `Output` shapes the state
//! output, and `Assign` updates variables. Expressions see `$states`
//! (`input`, `result`, `context`, and `errorOutput` in Catch handlers)
//! plus every workflow variable.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};

use crate::asl::{CatchRule, State};
use crate::errors::StatesError;
use crate::expr::jsonata::{self, JsonataScope};

use super::{DataFlow, Postprocessed};

pub(crate) struct JsonataFlow;

fn states_object(
    input: &Value,
    result: Option<&Value>,
    error_output: Option<&Value>,
    context_object: &Value,
) -> Value {
    let mut states = Map::new();
    states.insert("input".to_string(), input.clone());
    if let Some(result) = result {
        states.insert("result".to_string(), result.clone());
    }
    if let Some(error_output) = error_output {
        states.insert("errorOutput".to_string(), error_output.clone());
    }
    states.insert("context".to_string(), context_object.clone());
    Value::Object(states)
}

/// Evaluate a field value: wrapped strings yield the expression value,
/// objects and arrays are walked as templates, and plain values are
/// literal.
pub(crate) fn evaluate_field(
    value: &Value,
    scope: &JsonataScope,
) -> Result<Value, StatesError> {
    match value {
        Value::String(s) => Ok(jsonata::evaluate_string(s, scope)?.unwrap_or(Value::Null)),
        other => jsonata::evaluate_template(other, scope),
    }
}

impl DataFlow for JsonataFlow {
    fn preprocess(
        &self,
        state: &State,
        input: &Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Value, StatesError> {
        let common = state.common();
        // Map states bind Items/ItemSelector inside the iteration instead.
        if matches!(state, State::Map(_)) {
            return Ok(input.clone());
        }
        match &common.arguments {
            None => Ok(input.clone()),
            Some(arguments) => {
                let scope = JsonataScope::new(
                    states_object(input, None, None, context_object),
                    variables,
                );
                evaluate_field(arguments, &scope)
            }
        }
    }

    fn postprocess(
        &self,
        state: &State,
        _raw_input: &Value,
        effective_input: &Value,
        result: Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Postprocessed, StatesError> {
        let common = state.common();
        let scope = JsonataScope::new(
            states_object(effective_input, Some(&result), None, context_object),
            variables,
        );
        let output = match &common.output {
            None => result,
            Some(template) => evaluate_field(template, &scope)?,
        };
        let assignments = match &common.assign {
            Some(template) => expand_assignments(template, &scope)?,
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
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Value, StatesError> {
        let payload = json!({ "Error": error.error, "Cause": error.cause });
        match &rule.output {
            None => Ok(payload),
            Some(template) => {
                let scope = JsonataScope::new(
                    states_object(raw_input, None, Some(&payload), context_object),
                    variables,
                );
                evaluate_field(template, &scope)
            }
        }
    }
}

/// Expand a JSONata-mode `Assign` block. Wrapped strings store the
/// computed value; everything else is stored literally after a recursive
/// template walk.
pub(crate) fn expand_assignments(
    template: &Value,
    scope: &JsonataScope,
) -> Result<FxHashMap<String, Value>, StatesError> {
    let expanded = jsonata::evaluate_template(template, scope)?;
    let Value::Object(entries) = expanded else {
        return Err(StatesError::runtime("Assign must be an object"));
    };
    Ok(entries.into_iter().collect())
}
