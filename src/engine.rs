//! The top-level execution engine.
//!
//! Drives the state-transition loop over the compiled machine, threading
//! the execution context through every state, recording each completion,
//! and propagating error values through `Retry`/`Catch` (handled by the
//! executor layer) up to the final [`ExecutionOutcome`]. The engine never
//! throws for workflow faults; they surface as `{success: false, error}`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::asl::{Branch, State, StateMachine};
use crate::errors::StatesError;
use crate::exec::context::{
    ExecutionContext, ExecutionSeed, MapRun, ParallelRun, StateExecution,
};
use crate::exec::{self, RunError, StepOutcome};
use crate::mocks::{ExhaustPolicy, MockEngine};
use crate::types::StateKind;

/// Knobs for one engine instance.
///
/// `start_time` pins `$$.Execution.StartTime` for reproducible
/// Choice/Wait behavior; `stateful_exhaust_default` is the engine-wide
/// policy for stateful mocks called past their sequence.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub max_transitions: u64,
    pub machine_name: String,
    pub execution_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub stateful_exhaust_default: ExhaustPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_transitions: 10_000,
            machine_name: "TestStateMachine".to_string(),
            execution_name: None,
            start_time: None,
            stateful_exhaust_default: ExhaustPolicy::default(),
        }
    }
}

/// Everything observed during one execution.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: Value,
    pub error: Option<StatesError>,
    /// Top-level state names in entry order.
    pub execution_path: Vec<String>,
    /// Per-state records in completion order, nested executions included.
    pub state_executions: Vec<StateExecution>,
    pub variables: FxHashMap<String, Value>,
    pub map_runs: Vec<MapRun>,
    pub parallel_runs: Vec<ParallelRun>,
    /// `(choice state, chosen target)` pairs in decision order.
    pub choice_decisions: Vec<(String, String)>,
}

impl ExecutionOutcome {
    /// The user-visible error string, `"<Type>: <Cause>"`.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Executes a compiled machine against mock-backed tasks.
///
/// The machine is shared and immutable; the engine owns its mock engine
/// (whose call counters reset at the start of every execution).
pub struct Engine {
    machine: Arc<StateMachine>,
    mocks: MockEngine,
    options: EngineOptions,
}

impl Engine {
    #[must_use]
    pub fn new(machine: Arc<StateMachine>, mocks: MockEngine, options: EngineOptions) -> Self {
        let mocks = mocks.with_exhaust_default(options.stateful_exhaust_default);
        Self {
            machine,
            mocks,
            options,
        }
    }

    #[must_use]
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    #[must_use]
    pub fn mocks(&self) -> &MockEngine {
        &self.mocks
    }

    /// Run the machine end-to-end against the given input.
    #[instrument(skip_all, fields(machine = %self.options.machine_name))]
    pub async fn execute(&self, input: Value) -> ExecutionOutcome {
        self.mocks.reset();
        let seed = ExecutionSeed {
            machine_name: self.options.machine_name.clone(),
            execution_name: self
                .options
                .execution_name
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            start_time: self.options.start_time.unwrap_or_else(Utc::now),
        };
        let mut ctx = ExecutionContext::new(
            input,
            &seed,
            self.machine.timeout_seconds,
            self.options.max_transitions,
        );
        let branch = self.machine.as_branch();
        let result = self.run_branch(&branch, &mut ctx).await;
        let (success, output, error) = match result {
            Ok(output) => (true, output, None),
            Err(RunError::Fault(error)) => (false, Value::Null, Some(error)),
            Err(RunError::Cancelled) => (
                false,
                Value::Null,
                Some(StatesError::runtime("Execution was cancelled")),
            ),
        };
        ExecutionOutcome {
            success,
            output,
            error,
            execution_path: ctx.execution_path,
            state_executions: ctx.executions,
            variables: ctx.variables,
            map_runs: ctx.map_runs,
            parallel_runs: ctx.parallel_runs,
            choice_decisions: ctx.choice_decisions,
        }
    }

    /// Run one linear chain of states (the machine itself, a Map
    /// processor, or a Parallel branch) to completion.
    ///
    /// Boxed so Map/Parallel executors can recurse through it.
    pub(crate) fn run_branch<'a>(
        &'a self,
        branch: &'a Branch,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, RunError>> {
        Box::pin(async move {
            let mut current = branch.start_at.clone();
            loop {
                if let Err(error) = ctx.guard_transitions() {
                    return Err(RunError::Fault(error));
                }
                let Some(state) = branch.states.get(&current) else {
                    return Err(RunError::Fault(StatesError::runtime(format!(
                        "State '{current}' is not defined"
                    ))));
                };
                ctx.execution_path.push(current.clone());
                ctx.enter_state(&current);
                debug!(state = %current, kind = %state.kind(), "entering state");
                let input_snapshot = ctx.input.clone();
                let variables_before = ctx.variables_snapshot();

                match exec::execute_with_recovery(self, &current, state, ctx).await {
                    Ok(StepOutcome::Next { output, next }) => {
                        record(ctx, &current, state, input_snapshot, output.clone(), variables_before);
                        ctx.input = output;
                        current = next;
                    }
                    Ok(StepOutcome::Terminal { output }) => {
                        record(ctx, &current, state, input_snapshot, output.clone(), variables_before);
                        return Ok(output);
                    }
                    Err(RunError::Fault(error)) => {
                        record(
                            ctx,
                            &current,
                            state,
                            input_snapshot,
                            error.to_payload(),
                            variables_before,
                        );
                        return Err(RunError::Fault(error));
                    }
                    Err(RunError::Cancelled) => return Err(RunError::Cancelled),
                }
            }
        })
    }
}

fn record(
    ctx: &mut ExecutionContext,
    name: &str,
    state: &State,
    input: Value,
    output: Value,
    variables_before: Value,
) {
    let mut state_path = ctx.state_path.clone();
    state_path.push(name.to_string());
    let variables_after = ctx.variables_snapshot();
    ctx.executions.push(StateExecution {
        state_path,
        state: name.to_string(),
        parent_state: None,
        iteration_index: None,
        input,
        output,
        variables_before: Some(variables_before),
        variables_after: Some(variables_after),
        is_parallel_summary: state.kind() == StateKind::Parallel,
    });
}
