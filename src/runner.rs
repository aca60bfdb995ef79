//! The test runner: declarative cases with expectations, executed
//! against the engine and diffed into assertion lists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::asl::StateMachine;
use crate::coverage::{CoverageReport, CoverageTracker};
use crate::engine::{Engine, EngineOptions, ExecutionOutcome};
use crate::mocks::{MockEngine, StateMock};
use crate::utils::json_ext::{is_deep_subset, values_equal};

/// Partial matcher against one recorded state execution. All given
/// fields must deep-subset-match the record.
#[derive(Clone, Debug, Default)]
pub struct StateExpectation {
    pub state: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub variables: Option<Value>,
}

impl StateExpectation {
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

#[derive(Clone, Debug)]
pub struct MapExpectation {
    pub state: String,
    pub iteration_count: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct ParallelExpectation {
    pub state: String,
    pub branch_count: Option<usize>,
}

/// One declarative test case.
#[derive(Clone, Debug)]
pub struct TestCase {
    pub name: String,
    pub input: Value,
    pub expected_output: Option<Value>,
    pub expected_path: Option<Vec<String>>,
    /// Matches the error type (`"E"`) or the full `"<Type>: <Cause>"`.
    pub expected_error: Option<String>,
    pub state_expectations: Vec<StateExpectation>,
    pub map_expectations: Vec<MapExpectation>,
    pub parallel_expectations: Vec<ParallelExpectation>,
    /// Per-case mocks shadowing the suite mocks by state name.
    pub mock_overrides: Vec<StateMock>,
    pub skip: bool,
    pub timeout: Option<Duration>,
}

impl TestCase {
    #[must_use]
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            expected_output: None,
            expected_path: None,
            expected_error: None,
            state_expectations: Vec::new(),
            map_expectations: Vec::new(),
            parallel_expectations: Vec::new(),
            mock_overrides: Vec::new(),
            skip: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn expect_output(mut self, output: Value) -> Self {
        self.expected_output = Some(output);
        self
    }

    #[must_use]
    pub fn expect_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn expect_error(mut self, error: impl Into<String>) -> Self {
        self.expected_error = Some(error.into());
        self
    }

    #[must_use]
    pub fn expect_state(mut self, expectation: StateExpectation) -> Self {
        self.state_expectations.push(expectation);
        self
    }

    #[must_use]
    pub fn expect_map_iterations(mut self, state: impl Into<String>, count: usize) -> Self {
        self.map_expectations.push(MapExpectation {
            state: state.into(),
            iteration_count: Some(count),
        });
        self
    }

    #[must_use]
    pub fn expect_parallel_branches(mut self, state: impl Into<String>, count: usize) -> Self {
        self.parallel_expectations.push(ParallelExpectation {
            state: state.into(),
            branch_count: Some(count),
        });
        self
    }

    #[must_use]
    pub fn with_mock_override(mut self, mock: StateMock) -> Self {
        self.mock_overrides.push(mock);
        self
    }

    #[must_use]
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Timeout,
}

/// One diffed expectation.
#[derive(Clone, Debug)]
pub struct Assertion {
    pub description: String,
    pub passed: bool,
    pub expected: Value,
    pub actual: Value,
}

#[derive(Clone, Debug)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration: Duration,
    pub actual_output: Value,
    pub actual_path: Vec<String>,
    pub actual_error: Option<String>,
    pub assertions: Vec<Assertion>,
}

#[derive(Clone, Debug, Default)]
pub struct SuiteResult {
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed) + self.count(TestStatus::Timeout)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Runs test cases against one machine, accumulating coverage.
pub struct TestRunner {
    machine: Arc<StateMachine>,
    mocks: MockEngine,
    options: EngineOptions,
    coverage: CoverageTracker,
}

impl TestRunner {
    #[must_use]
    pub fn new(machine: Arc<StateMachine>, mocks: MockEngine) -> Self {
        Self::with_options(machine, mocks, EngineOptions::default())
    }

    #[must_use]
    pub fn with_options(
        machine: Arc<StateMachine>,
        mocks: MockEngine,
        options: EngineOptions,
    ) -> Self {
        let coverage = CoverageTracker::new(Arc::clone(&machine));
        Self {
            machine,
            mocks,
            options,
            coverage,
        }
    }

    pub async fn run_suite(&mut self, suite: &TestSuite) -> SuiteResult {
        info!(suite = %suite.name, cases = suite.cases.len(), "running suite");
        let mut results = Vec::with_capacity(suite.cases.len());
        for case in &suite.cases {
            results.push(self.run_case(case).await);
        }
        SuiteResult { results }
    }

    pub async fn run_case(&mut self, case: &TestCase) -> TestResult {
        if case.skip {
            return TestResult {
                name: case.name.clone(),
                status: TestStatus::Skipped,
                duration: Duration::ZERO,
                actual_output: Value::Null,
                actual_path: Vec::new(),
                actual_error: None,
                assertions: Vec::new(),
            };
        }
        debug!(case = %case.name, "running case");
        let mocks = self.mocks.with_overrides(&case.mock_overrides);
        let engine = Engine::new(Arc::clone(&self.machine), mocks, self.options.clone());
        let started = Instant::now();
        let outcome = match case.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, engine.execute(case.input.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return TestResult {
                            name: case.name.clone(),
                            status: TestStatus::Timeout,
                            duration: started.elapsed(),
                            actual_output: Value::Null,
                            actual_path: Vec::new(),
                            actual_error: None,
                            assertions: Vec::new(),
                        };
                    }
                }
            }
            None => engine.execute(case.input.clone()).await,
        };
        self.coverage.record(&outcome);

        let assertions = diff(case, &outcome);
        let status = if assertions.iter().all(|a| a.passed) {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        TestResult {
            name: case.name.clone(),
            status,
            duration: started.elapsed(),
            actual_output: outcome.output,
            actual_path: outcome.execution_path,
            actual_error: outcome.error.map(|e| e.to_string()),
            assertions,
        }
    }

    #[must_use]
    pub fn coverage_report(&self) -> CoverageReport {
        self.coverage.report()
    }
}

fn diff(case: &TestCase, outcome: &ExecutionOutcome) -> Vec<Assertion> {
    let mut assertions = Vec::new();

    match &case.expected_error {
        Some(expected) => {
            let actual = outcome.error_message().unwrap_or_default();
            let matched = outcome
                .error
                .as_ref()
                .is_some_and(|e| e.error == *expected || e.to_string() == *expected);
            assertions.push(Assertion {
                description: "error".to_string(),
                passed: matched,
                expected: json!(expected),
                actual: json!(actual),
            });
        }
        None => {
            if !outcome.success {
                assertions.push(Assertion {
                    description: "execution succeeds".to_string(),
                    passed: false,
                    expected: json!(true),
                    actual: json!(outcome.error_message()),
                });
            }
        }
    }

    if let Some(expected) = &case.expected_output {
        assertions.push(Assertion {
            description: "output".to_string(),
            passed: values_equal(expected, &outcome.output),
            expected: expected.clone(),
            actual: outcome.output.clone(),
        });
    }

    if let Some(expected) = &case.expected_path {
        assertions.push(Assertion {
            description: "executionPath".to_string(),
            passed: *expected == outcome.execution_path,
            expected: json!(expected),
            actual: json!(outcome.execution_path),
        });
    }

    for expectation in &case.state_expectations {
        let matched = outcome.state_executions.iter().any(|record| {
            record.state == expectation.state
                && expectation
                    .input
                    .as_ref()
                    .is_none_or(|e| is_deep_subset(e, &record.input))
                && expectation
                    .output
                    .as_ref()
                    .is_none_or(|e| is_deep_subset(e, &record.output))
                && expectation.variables.as_ref().is_none_or(|e| {
                    record
                        .variables_after
                        .as_ref()
                        .is_some_and(|v| is_deep_subset(e, v))
                })
        });
        let last_actual = outcome
            .state_executions
            .iter()
            .rev()
            .find(|r| r.state == expectation.state)
            .map(|r| json!({ "input": r.input, "output": r.output, "variables": r.variables_after }))
            .unwrap_or(Value::Null);
        assertions.push(Assertion {
            description: format!("state '{}'", expectation.state),
            passed: matched,
            expected: json!({
                "input": expectation.input,
                "output": expectation.output,
                "variables": expectation.variables,
            }),
            actual: last_actual,
        });
    }

    for expectation in &case.map_expectations {
        let actual = outcome
            .map_runs
            .iter()
            .find(|r| r.state == expectation.state);
        let passed = match (expectation.iteration_count, actual) {
            (Some(expected), Some(run)) => run.iteration_count == expected,
            (None, Some(_)) => true,
            _ => false,
        };
        assertions.push(Assertion {
            description: format!("map '{}' iterations", expectation.state),
            passed,
            expected: json!(expectation.iteration_count),
            actual: json!(actual.map(|r| r.iteration_count)),
        });
    }

    for expectation in &case.parallel_expectations {
        let actual = outcome
            .parallel_runs
            .iter()
            .find(|r| r.state == expectation.state);
        let passed = match (expectation.branch_count, actual) {
            (Some(expected), Some(run)) => run.branch_count == expected,
            (None, Some(_)) => true,
            _ => false,
        };
        assertions.push(Assertion {
            description: format!("parallel '{}' branches", expectation.state),
            passed,
            expected: json!(expectation.branch_count),
            actual: json!(actual.map(|r| r.branch_count)),
        });
    }

    assertions
}
