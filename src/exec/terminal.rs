//! Succeed and Fail executors.

use serde_json::{Value, json};

use crate::asl::{FailState, State, SucceedState};
use crate::dataflow::strategy_for;
use crate::errors::StatesError;
use crate::expr::jsonata::{self, JsonataScope};
use crate::expr::jsonpath::{self, EvalScope};

use super::context::ExecutionContext;
use super::{RunError, StepOutcome};

/// Succeed applies `InputPath`/`OutputPath` (or `Output`) and terminates.
pub(crate) fn succeed(
    succeed: &SucceedState,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    let flow = strategy_for(succeed.common.query_language);
    let raw_input = ctx.input.clone();
    let effective =
        flow.preprocess(state, &raw_input, &ctx.variables, &ctx.context_object)?;
    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        effective.clone(),
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    Ok(StepOutcome::Terminal {
        output: processed.output,
    })
}

/// Fail terminates the machine with `"<Error>: <Cause>"`, defaulting to
/// `States.Failed` / `"State failed"`.
pub(crate) fn fail(fail: &FailState, ctx: &mut ExecutionContext) -> Result<StepOutcome, RunError> {
    let input = ctx.input.clone();
    let scope = EvalScope::new(&input, &ctx.context_object, &ctx.variables);

    let error = match (&fail.error, &fail.error_path) {
        (Some(error), _) => resolve_text(error, &input, ctx)?,
        (None, Some(path)) => path_text(path, &scope)?,
        (None, None) => "States.Failed".to_string(),
    };
    let cause = match (&fail.cause, &fail.cause_path) {
        (Some(cause), _) => resolve_text(cause, &input, ctx)?,
        (None, Some(path)) => path_text(path, &scope)?,
        (None, None) => "State failed".to_string(),
    };
    Err(RunError::Fault(StatesError::new(error, cause)))
}

fn resolve_text(
    value: &str,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<String, StatesError> {
    if jsonata::is_expression(value) {
        let states = json!({ "input": input, "context": ctx.context_object });
        let scope = JsonataScope::new(states, &ctx.variables);
        let resolved = jsonata::evaluate_string(value, &scope)?;
        return Ok(match resolved {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        });
    }
    Ok(value.to_string())
}

fn path_text(path: &str, scope: &EvalScope<'_>) -> Result<String, StatesError> {
    let value = jsonpath::evaluate(path, scope)?;
    match value {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}
