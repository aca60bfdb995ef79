//! Parallel executor: static fan-out over branches, fan-in as an array
//! in branch order.
//!
//! Every branch receives the same preprocessed input and a copy of the
//! outer variables. An unhandled branch failure flips the shared
//! cancellation flag; sibling branches observe it at their next
//! suspension point and stop, keeping their partial records.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use serde_json::Value;
use tracing::debug;

use crate::asl::{ParallelState, State};
use crate::dataflow::strategy_for;
use crate::engine::Engine;
use crate::errors::StatesError;

use super::context::{ExecutionContext, ParallelRun};
use super::{RunError, StepOutcome, transition};

pub(crate) async fn execute(
    engine: &Engine,
    name: &str,
    parallel: &ParallelState,
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
    debug!(state = name, branches = parallel.branches.len(), "parallel fan-out");

    let fanout_cancel = Arc::new(AtomicBool::new(false));
    let mut children = Vec::with_capacity(parallel.branches.len());
    for index in 0..parallel.branches.len() {
        let mut path = ctx.state_path.clone();
        path.push(name.to_string());
        path.push(index.to_string());
        children.push(ctx.child(
            effective.clone(),
            ctx.variables.clone(),
            path,
            Arc::clone(&fanout_cancel),
        ));
    }

    let branch_count = parallel.branches.len();
    let results: Vec<(usize, Result<Value, RunError>, ExecutionContext)> =
        stream::iter(children.into_iter().enumerate().map(|(index, mut child)| {
            let cancel = Arc::clone(&fanout_cancel);
            let branch = &parallel.branches[index];
            async move {
                // Suspension point: awaiting child completion.
                tokio::task::yield_now().await;
                let outcome = engine.run_branch(branch, &mut child).await;
                if matches!(outcome, Err(RunError::Fault(_))) {
                    cancel.store(true, Ordering::Relaxed);
                }
                (index, outcome, child)
            }
        }))
        .buffered(branch_count.max(1))
        .collect()
        .await;

    let mut outputs = Vec::with_capacity(branch_count);
    let mut first_failure: Option<StatesError> = None;
    for (index, outcome, child) in results {
        ctx.absorb_child(child, name, index);
        match outcome {
            Ok(output) => outputs.push(output),
            Err(RunError::Fault(error)) => {
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
            Err(RunError::Cancelled) => {}
        }
    }
    ctx.parallel_runs.push(ParallelRun {
        state: name.to_string(),
        branch_count,
    });

    if let Some(error) = first_failure {
        return Err(RunError::Fault(error));
    }

    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        Value::Array(outputs),
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    transition(common, processed.output)
}
