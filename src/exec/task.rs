//! Task executor: preprocess → mock resolution → postprocess.

use serde_json::Value;
use tracing::debug;

use crate::asl::{State, TaskState};
use crate::dataflow::strategy_for;
use crate::engine::Engine;
use crate::errors::StatesError;
use crate::expr::jsonpath::{self, EvalScope};

use super::context::ExecutionContext;
use super::{RunError, StepOutcome, transition};

pub(crate) async fn execute(
    engine: &Engine,
    name: &str,
    task: &TaskState,
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

    // Suspension point: awaiting mock resolution.
    tokio::task::yield_now().await;
    if ctx.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    let response = engine.mocks().resolve(name, &effective)?;
    debug!(state = name, resource = %task.resource, "task mock resolved");

    if let Some(delay) = response.delay_seconds {
        if let Some(timeout) = task_timeout(task, &raw_input, ctx)? {
            if delay > timeout {
                return Err(RunError::Fault(StatesError::timeout(format!(
                    "Task '{name}' exceeded its timeout of {timeout} second(s)"
                ))));
            }
        }
        ctx.clock.advance_seconds(delay)?;
    }

    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        response.value,
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    transition(common, processed.output)
}

fn task_timeout(
    task: &TaskState,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<Option<f64>, StatesError> {
    if let Some(seconds) = task.timeout_seconds {
        return Ok(Some(seconds));
    }
    if let Some(path) = &task.timeout_seconds_path {
        let scope = EvalScope::new(input, &ctx.context_object, &ctx.variables);
        let value = jsonpath::evaluate(path, &scope)?;
        return value
            .as_f64()
            .map(Some)
            .ok_or_else(|| StatesError::runtime("TimeoutSecondsPath must reference a number"));
    }
    Ok(None)
}
