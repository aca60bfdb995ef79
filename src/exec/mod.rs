//! Per-variant state executors and the retry/catch recovery wrapper.
//!
//! Executors are async functions returning a [`StepOutcome`]; errors are
//! [`StatesError`] values carried in [`RunError::Fault`], never panics.
//! Suspension points (mock resolution, waits, child joins) yield to the
//! cooperative scheduler and observe the fan-out cancellation flag.

pub mod context;

mod choice;
mod map;
mod parallel;
mod pass;
mod retry;
mod task;
mod terminal;
mod wait;

use serde_json::Value;
use tracing::debug;

use crate::asl::State;
use crate::dataflow::{jsonata_assignments, jsonpath_assignments, strategy_for};
use crate::engine::Engine;
use crate::errors::StatesError;
use crate::expr::jsonata::JsonataScope;
use crate::expr::jsonpath::EvalScope;

use context::ExecutionContext;

/// Why a state body did not produce an outcome.
#[derive(Debug)]
pub(crate) enum RunError {
    /// A workflow fault, subject to `Retry`/`Catch` and tolerance.
    Fault(StatesError),
    /// The enclosing fan-out was cancelled by a sibling failure.
    Cancelled,
}

impl From<StatesError> for RunError {
    fn from(error: StatesError) -> Self {
        RunError::Fault(error)
    }
}

/// Result of one completed state.
#[derive(Debug)]
pub(crate) enum StepOutcome {
    Next { output: Value, next: String },
    Terminal { output: Value },
}

/// Build the outcome for a state that completed with `output`.
pub(crate) fn transition(
    common: &crate::asl::TransformFields,
    output: Value,
) -> Result<StepOutcome, RunError> {
    match &common.next {
        Some(next) => Ok(StepOutcome::Next {
            output,
            next: next.clone(),
        }),
        None => Ok(StepOutcome::Terminal { output }),
    }
}

async fn execute_once(
    engine: &Engine,
    name: &str,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    match state {
        State::Task(task) => task::execute(engine, name, task, state, ctx).await,
        State::Pass(pass) => pass::execute(pass, state, ctx),
        State::Choice(choice) => choice::execute(name, choice, ctx),
        State::Wait(wait) => wait::execute(wait, state, ctx).await,
        State::Succeed(succeed) => terminal::succeed(succeed, state, ctx),
        State::Fail(fail) => terminal::fail(fail, ctx),
        State::Map(map) => map::execute(engine, name, map, state, ctx).await,
        State::Parallel(parallel) => {
            parallel::execute(engine, name, parallel, state, ctx).await
        }
    }
}

/// Run a state body under its `Retry` and `Catch` policies.
///
/// Retries re-execute the whole body (preprocess, mock call, postprocess)
/// with exponentially backed-off virtual sleeps; exhausted or unmatched
/// errors fall through to `Catch`, whose handler receives the shaped
/// `{Error, Cause}` payload. Anything still unhandled propagates upward.
pub(crate) async fn execute_with_recovery(
    engine: &Engine,
    name: &str,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    let common = state.common();
    let mut attempts = vec![0u32; common.retry.len()];
    loop {
        let error = match execute_once(engine, name, state, ctx).await {
            Ok(outcome) => return Ok(outcome),
            Err(RunError::Cancelled) => return Err(RunError::Cancelled),
            Err(RunError::Fault(error)) => error,
        };

        let matched_retry = common.retry.iter().enumerate().find(|(index, rule)| {
            attempts[*index] < rule.max_attempts
                && rule.error_equals.iter().any(|p| error.matches(p))
        });
        if let Some((index, rule)) = matched_retry {
            let delay = retry::delay_seconds(rule, attempts[index]);
            attempts[index] += 1;
            ctx.set_retry_count(attempts[index]);
            debug!(state = name, attempt = attempts[index], delay, "retrying after error");
            if let Err(timeout) = ctx.clock.advance_seconds(delay) {
                return Err(RunError::Fault(timeout));
            }
            tokio::task::yield_now().await;
            continue;
        }

        let Some(rule) = common
            .catch
            .iter()
            .find(|rule| rule.error_equals.iter().any(|p| error.matches(p)))
        else {
            return Err(RunError::Fault(error));
        };
        debug!(state = name, error = %error, next = %rule.next, "caught error");
        let flow = strategy_for(common.query_language);
        let output = flow
            .catch_output(rule, &ctx.input, &error, &ctx.variables, &ctx.context_object)
            .map_err(RunError::Fault)?;
        if let Some(assign) = &rule.assign {
            let assignments = if common.query_language.is_jsonata() {
                let states = serde_json::json!({
                    "input": ctx.input,
                    "errorOutput": error.to_payload(),
                    "context": ctx.context_object,
                });
                jsonata_assignments(assign, &JsonataScope::new(states, &ctx.variables))
                    .map_err(RunError::Fault)?
            } else {
                let payload = error.to_payload();
                let scope = EvalScope::new(&payload, &ctx.context_object, &ctx.variables);
                jsonpath_assignments(assign, &scope).map_err(RunError::Fault)?
            };
            ctx.commit_assignments(assignments);
        }
        return Ok(StepOutcome::Next {
            output,
            next: rule.next.clone(),
        });
    }
}
