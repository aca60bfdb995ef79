//! Wait executor. Never sleeps: the intended duration is charged to the
//! virtual clock, which enforces the machine's time budget.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::debug;

use crate::asl::{State, WaitDuration, WaitState};
use crate::dataflow::strategy_for;
use crate::errors::StatesError;
use crate::expr::jsonata::{self, JsonataScope};
use crate::expr::jsonpath::{self, EvalScope};

use super::context::ExecutionContext;
use super::{RunError, StepOutcome, transition};

pub(crate) async fn execute(
    wait: &WaitState,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    if ctx.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    let common = state.common();
    let flow = strategy_for(common.query_language);
    let raw_input = ctx.input.clone();
    let effective =
        flow.preprocess(state, &raw_input, &ctx.variables, &ctx.context_object)?;

    let seconds = duration_seconds(wait, &effective, ctx)?;
    debug!(seconds, "wait charged to virtual clock");

    // Suspension point: awaiting virtual time.
    tokio::task::yield_now().await;
    if ctx.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    ctx.clock.advance_seconds(seconds)?;

    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        effective.clone(),
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    transition(common, processed.output)
}

fn duration_seconds(
    wait: &WaitState,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<f64, StatesError> {
    let scope = EvalScope::new(input, &ctx.context_object, &ctx.variables);
    match &wait.duration {
        WaitDuration::Seconds(value) => as_seconds(&resolve_value(value, input, ctx)?),
        WaitDuration::SecondsPath(path) => as_seconds(&jsonpath::evaluate(path, &scope)?),
        WaitDuration::Timestamp(value) => {
            timestamp_delta(&resolve_value(value, input, ctx)?, ctx)
        }
        WaitDuration::TimestampPath(path) => {
            timestamp_delta(&jsonpath::evaluate(path, &scope)?, ctx)
        }
    }
}

/// In JSONata mode the duration fields may be wrapped expressions.
fn resolve_value(
    value: &Value,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<Value, StatesError> {
    match value {
        Value::String(s) if jsonata::is_expression(s) => {
            let states = json!({ "input": input, "context": ctx.context_object });
            let scope = JsonataScope::new(states, &ctx.variables);
            Ok(jsonata::evaluate_string(s, &scope)?.unwrap_or(Value::Null))
        }
        other => Ok(other.clone()),
    }
}

fn as_seconds(value: &Value) -> Result<f64, StatesError> {
    value
        .as_f64()
        .filter(|s| *s >= 0.0)
        .ok_or_else(|| StatesError::runtime("Wait Seconds must be a non-negative number"))
}

/// Seconds between the execution start (plus already-elapsed virtual
/// time) and the target timestamp; past timestamps wait zero.
fn timestamp_delta(value: &Value, ctx: &ExecutionContext) -> Result<f64, StatesError> {
    let target = value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .ok_or_else(|| {
            StatesError::runtime("Wait Timestamp must be an RFC 3339 timestamp string")
        })?;
    let start = ctx
        .context_object
        .get("Execution")
        .and_then(|e| e.get("StartTime"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc));
    let now_ms = start.timestamp_millis() + ctx.clock.elapsed_ms() as i64;
    let delta_ms = target.timestamp_millis() - now_ms;
    Ok((delta_ms.max(0) as f64) / 1000.0)
}
