//! Per-run execution state: the context object, variable store, virtual
//! clock, and recorded per-state executions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};

use crate::errors::StatesError;

/// A virtual-time clock shared by a run and all of its sub-executions.
///
/// Nothing ever sleeps; Wait states, retry backoff, and mock latency
/// charge their duration here, and exceeding the machine budget raises
/// `States.Timeout`.
#[derive(Clone, Debug)]
pub struct VirtualClock {
    inner: Arc<Mutex<ClockInner>>,
}

#[derive(Debug)]
struct ClockInner {
    elapsed_ms: u64,
    budget_ms: Option<u64>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(budget_seconds: Option<f64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                elapsed_ms: 0,
                budget_ms: budget_seconds.map(|s| (s * 1000.0) as u64),
            })),
        }
    }

    /// Charge virtual time, raising `States.Timeout` when the machine
    /// budget is exceeded.
    pub fn advance_seconds(&self, seconds: f64) -> Result<(), StatesError> {
        let mut inner = self.inner.lock().expect("clock lock");
        inner.elapsed_ms = inner.elapsed_ms.saturating_add((seconds * 1000.0) as u64);
        if let Some(budget) = inner.budget_ms {
            if inner.elapsed_ms > budget {
                return Err(StatesError::timeout(format!(
                    "Execution exceeded the state machine timeout of {} ms",
                    budget
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.inner.lock().expect("clock lock").elapsed_ms
    }
}

/// One recorded state completion, in completion order.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExecution {
    /// Nesting path: ancestors, iteration indices, then the state name.
    pub state_path: Vec<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_index: Option<usize>,
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_after: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_parallel_summary: bool,
}

/// Summary of one Map state's run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRun {
    pub state: String,
    pub iteration_count: usize,
    pub failed_count: usize,
}

/// Summary of one Parallel state's run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelRun {
    pub state: String,
    pub branch_count: usize,
}

/// Fixed facts about the run used to build the `$$` context object.
#[derive(Clone, Debug)]
pub struct ExecutionSeed {
    pub machine_name: String,
    pub execution_name: String,
    pub start_time: DateTime<Utc>,
}

/// Mutable state for one (sub-)execution.
///
/// A fresh context is created per run. Map iterations and Parallel
/// branches get children that share the clock and step counter but own
/// their input, variables, and records; variables never flow back up
/// except through the state's collected output.
#[derive(Debug)]
pub struct ExecutionContext {
    /// The current state's raw input.
    pub input: Value,
    pub original_input: Value,
    pub variables: FxHashMap<String, Value>,
    pub execution_path: Vec<String>,
    pub executions: Vec<StateExecution>,
    /// Nesting prefix for records, e.g. `["OuterMap", "2"]`.
    pub state_path: Vec<String>,
    pub context_object: Value,
    pub clock: VirtualClock,
    pub cancel: Arc<AtomicBool>,
    pub choice_decisions: Vec<(String, String)>,
    pub map_runs: Vec<MapRun>,
    pub parallel_runs: Vec<ParallelRun>,
    steps: Arc<AtomicU64>,
    max_steps: u64,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(
        input: Value,
        seed: &ExecutionSeed,
        budget_seconds: Option<f64>,
        max_steps: u64,
    ) -> Self {
        let start_time = seed.start_time.to_rfc3339();
        let context_object = json!({
            "Execution": {
                "Id": format!(
                    "arn:aws:states:local:123456789012:execution:{}:{}",
                    seed.machine_name, seed.execution_name
                ),
                "Name": seed.execution_name,
                "StartTime": start_time,
                "Input": input,
                "RoleArn": "arn:aws:iam::123456789012:role/StepBenchTestRole",
            },
            "StateMachine": {
                "Id": format!(
                    "arn:aws:states:local:123456789012:stateMachine:{}",
                    seed.machine_name
                ),
                "Name": seed.machine_name,
            },
            "State": {
                "Name": "",
                "EnteredTime": start_time,
                "RetryCount": 0,
            },
            "Task": {
                "Token": uuid::Uuid::new_v4().to_string(),
            },
        });
        Self {
            original_input: input.clone(),
            input,
            variables: FxHashMap::default(),
            execution_path: Vec::new(),
            executions: Vec::new(),
            state_path: Vec::new(),
            context_object,
            clock: VirtualClock::new(budget_seconds),
            cancel: Arc::new(AtomicBool::new(false)),
            choice_decisions: Vec::new(),
            map_runs: Vec::new(),
            parallel_runs: Vec::new(),
            steps: Arc::new(AtomicU64::new(0)),
            max_steps,
        }
    }

    /// A child context for one Map iteration or Parallel branch.
    ///
    /// Shares the clock and the global step counter; takes the given
    /// cancellation flag (fan-out scopes create a fresh one), its own
    /// input and variable snapshot, and empty records.
    #[must_use]
    pub fn child(
        &self,
        input: Value,
        variables: FxHashMap<String, Value>,
        state_path: Vec<String>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            original_input: input.clone(),
            input,
            variables,
            execution_path: Vec::new(),
            executions: Vec::new(),
            state_path,
            context_object: self.context_object.clone(),
            clock: self.clock.clone(),
            cancel,
            choice_decisions: Vec::new(),
            map_runs: Vec::new(),
            parallel_runs: Vec::new(),
            steps: Arc::clone(&self.steps),
            max_steps: self.max_steps,
        }
    }

    /// Bump the shared transition counter, guarding against runaway
    /// loops.
    pub fn guard_transitions(&self) -> Result<(), StatesError> {
        let taken = self.steps.fetch_add(1, Ordering::Relaxed);
        if taken >= self.max_steps {
            return Err(StatesError::runtime(format!(
                "Execution exceeded the maximum of {} state transitions",
                self.max_steps
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn enter_state(&mut self, name: &str) {
        if let Some(state) = self.context_object.get_mut("State") {
            state["Name"] = json!(name);
            state["RetryCount"] = json!(0);
        }
    }

    pub fn set_retry_count(&mut self, count: u32) {
        if let Some(state) = self.context_object.get_mut("State") {
            state["RetryCount"] = json!(count);
        }
    }

    /// Bind `$$.Map.Item` for one iteration.
    pub fn set_map_item(&mut self, index: usize, value: &Value) {
        self.context_object["Map"] = json!({
            "Item": { "Index": index, "Value": value }
        });
    }

    /// The variable store as a JSON object, for records and reports.
    #[must_use]
    pub fn variables_snapshot(&self) -> Value {
        Value::Object(
            self.variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Commit an `Assign` result atomically.
    pub fn commit_assignments(&mut self, assignments: FxHashMap<String, Value>) {
        for (name, value) in assignments {
            self.variables.insert(name, value);
        }
    }

    /// Fold a finished child (Map iteration or Parallel branch) back into
    /// this context: records gain their parent attribution, decisions and
    /// nested run summaries are appended. Variables deliberately do not
    /// flow back.
    pub fn absorb_child(&mut self, child: ExecutionContext, parent: &str, index: usize) {
        for mut record in child.executions {
            if record.parent_state.is_none() {
                record.parent_state = Some(parent.to_string());
                record.iteration_index = Some(index);
            }
            self.executions.push(record);
        }
        self.choice_decisions.extend(child.choice_decisions);
        self.map_runs.extend(child.map_runs);
        self.parallel_runs.extend(child.parallel_runs);
    }
}
