//! Error surface for the stepbench interpreter.
//!
//! Two distinct families live here:
//!
//! - [`StatesError`]: the *runtime* error value that flows through a
//!   workflow execution. These are ordinary values matched by `Retry`/
//!   `Catch` rules, merged into state output, and reported in the final
//!   outcome. They never unwind the stack.
//! - [`ValidationError`]: *definition-time* failures raised by the state
//!   factory before execution begins. Their `Display` strings are part of
//!   the crate's contract and are asserted verbatim by tests.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Canonical error names from the States Language specification.
pub mod names {
    /// Matcher-only wildcard: matches every error.
    pub const ALL: &str = "States.ALL";
    pub const TASK_FAILED: &str = "States.TaskFailed";
    pub const TIMEOUT: &str = "States.Timeout";
    pub const RUNTIME: &str = "States.Runtime";
    pub const DATA_LIMIT_EXCEEDED: &str = "States.DataLimitExceeded";
    pub const FAILED: &str = "States.Failed";
    pub const EXCEED_TOLERATED_FAILURE: &str = "States.ExceedToleratedFailureThreshold";
    pub const MOCK_NOT_FOUND: &str = "MockNotFound";
    pub const CHOICE_NO_MATCH: &str = "ChoiceNoMatch";
    pub const ITEM_READER_FORMAT_MISMATCH: &str = "MapItemReaderFormatMismatch";
}

/// A workflow-level error value: `{type, cause}`.
///
/// The user-visible rendering is `"<Type>: <Cause>"`. Canonical types are
/// listed in [`names`]; any other string is a user-defined type raised by an
/// `error` mock or a `Fail` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatesError {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause")]
    pub cause: String,
}

impl StatesError {
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            cause: cause.into(),
        }
    }

    pub fn runtime(cause: impl Into<String>) -> Self {
        Self::new(names::RUNTIME, cause)
    }

    pub fn task_failed(cause: impl Into<String>) -> Self {
        Self::new(names::TASK_FAILED, cause)
    }

    pub fn timeout(cause: impl Into<String>) -> Self {
        Self::new(names::TIMEOUT, cause)
    }

    pub fn mock_not_found(state: &str) -> Self {
        Self::new(
            names::MOCK_NOT_FOUND,
            format!("No mock configured for state '{state}'"),
        )
    }

    pub fn no_choice_match(state: &str) -> Self {
        Self::new(
            names::CHOICE_NO_MATCH,
            format!("No choice rule matched in state '{state}' and no Default is set"),
        )
    }

    /// Invalid JSONPath reference, using the message format the Choice
    /// executor is contractually bound to.
    pub fn invalid_choice_path(path: &str) -> Self {
        Self::runtime(format!(
            "Invalid path '{path}': The choice state's condition path references an invalid value."
        ))
    }

    pub fn invalid_path(path: &str, detail: &str) -> Self {
        Self::runtime(format!("Invalid path '{path}': {detail}"))
    }

    /// Whether this error is selected by an `ErrorEquals` pattern.
    ///
    /// `States.ALL` matches everything. `States.TaskFailed` acts as a
    /// wildcard for task failures: itself plus any user-defined (non
    /// `States.`-prefixed) type. Everything else matches by equality.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == names::ALL {
            return true;
        }
        if pattern == names::TASK_FAILED {
            return self.error == names::TASK_FAILED || !self.error.starts_with("States.");
        }
        self.error == pattern
    }

    /// The `{Error, Cause}` payload handed to `Catch` handlers.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({ "Error": self.error, "Cause": self.cause })
    }
}

impl fmt::Display for StatesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.cause)
    }
}

impl std::error::Error for StatesError {}

/// Definition-time validation failure.
///
/// `Display` output is exact and stable; the test suite asserts these
/// strings verbatim. When a single state carries several violations they
/// are collected into [`ValidationError::Multiple`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ValidationError {
    #[error("Parameters field is not supported in JSONata mode. Use Arguments field instead")]
    #[diagnostic(code(stepbench::factory::parameters_in_jsonata))]
    ParametersInJsonata,

    #[error("{field} field is not supported in JSONata mode. Use {base} field instead")]
    #[diagnostic(code(stepbench::factory::path_field_in_jsonata))]
    PathFieldInJsonata {
        field: &'static str,
        base: &'static str,
    },

    #[error("InputPath field is not supported in JSONata mode. Use Assign field instead")]
    #[diagnostic(code(stepbench::factory::input_path_in_jsonata))]
    InputPathInJsonata,

    #[error("ResultPath field is not supported in JSONata mode. Use Output field instead")]
    #[diagnostic(code(stepbench::factory::result_path_in_jsonata))]
    ResultPathInJsonata,

    #[error("ResultSelector field is not supported in JSONata mode. Use Output field instead")]
    #[diagnostic(code(stepbench::factory::result_selector_in_jsonata))]
    ResultSelectorInJsonata,

    #[error(
        "JSONPath choice rule fields (Variable, And, Or, Not) are not supported in JSONata mode. Use 'Condition' field instead"
    )]
    #[diagnostic(code(stepbench::factory::jsonpath_choice_in_jsonata))]
    JsonPathChoiceInJsonata,

    #[error("{field} field is not supported in JSONPath mode. Use {base} field instead")]
    #[diagnostic(code(stepbench::factory::field_in_jsonpath))]
    FieldInJsonPath {
        field: &'static str,
        base: &'static str,
    },

    #[error("Arguments field is required for resource ARN: {resource}")]
    #[diagnostic(
        code(stepbench::factory::arguments_required),
        help("Integrated-service ARNs (containing ':::') take their request payload from Arguments.")
    )]
    ArgumentsRequired { resource: String },

    #[error("Terminal state {state} cannot have a Next field")]
    #[diagnostic(code(stepbench::factory::terminal_next))]
    TerminalWithNext { state: String },

    #[error("State {state} cannot have both Next and End fields")]
    #[diagnostic(code(stepbench::factory::next_and_end))]
    NextWithEnd { state: String },

    #[error("State {state} must have either a Next field or End: true")]
    #[diagnostic(code(stepbench::factory::no_transition))]
    MissingTransition { state: String },

    #[error("Pass state does not support Arguments field")]
    #[diagnostic(code(stepbench::factory::pass_arguments))]
    PassArguments,

    #[error("Task state requires Resource field")]
    #[diagnostic(code(stepbench::factory::task_resource))]
    TaskRequiresResource,

    #[error("Map state requires ItemProcessor or Iterator field")]
    #[diagnostic(code(stepbench::factory::map_processor))]
    MapRequiresProcessor,

    #[error("ItemProcessor/Iterator requires StartAt field")]
    #[diagnostic(code(stepbench::factory::processor_start_at))]
    ProcessorRequiresStartAt,

    #[error("Parallel state requires non-empty Branches array")]
    #[diagnostic(code(stepbench::factory::parallel_branches))]
    ParallelRequiresBranches,

    #[error("Choice state requires non-empty Choices array")]
    #[diagnostic(code(stepbench::factory::choice_rules))]
    ChoiceRequiresRules,

    #[error("Choice Condition must be a JSONata expression wrapped in {{% %}}")]
    #[diagnostic(code(stepbench::factory::choice_condition))]
    ChoiceConditionNotWrapped,

    #[error("Choice rule is missing a comparison operator")]
    #[diagnostic(code(stepbench::factory::choice_operator))]
    ChoiceRuleMissingOperator,

    #[error("Choice rule comparison requires a Variable field")]
    #[diagnostic(code(stepbench::factory::choice_variable))]
    ChoiceRuleMissingVariable,

    #[error("Choice rule requires a Next field")]
    #[diagnostic(code(stepbench::factory::choice_next))]
    ChoiceRuleMissingNext,

    #[error("Choice state does not support {field} field")]
    #[diagnostic(code(stepbench::factory::choice_io))]
    ChoiceUnsupportedField { field: &'static str },

    #[error("Terminal state {state} cannot have a {field} field")]
    #[diagnostic(code(stepbench::factory::terminal_field))]
    TerminalUnsupportedField { state: String, field: &'static str },

    #[error("{field} field must be a string or null")]
    #[diagnostic(code(stepbench::factory::field_type))]
    InvalidFieldType { field: &'static str },

    #[error("Fail state cannot have both Cause and CausePath fields")]
    #[diagnostic(code(stepbench::factory::fail_cause))]
    FailBothCause,

    #[error("Fail state cannot have both Error and ErrorPath fields")]
    #[diagnostic(code(stepbench::factory::fail_error))]
    FailBothError,

    #[error("Wait state must have exactly one wait duration field")]
    #[diagnostic(code(stepbench::factory::wait_duration))]
    WaitCardinality,

    #[error("State {state} has unknown type {kind}")]
    #[diagnostic(code(stepbench::factory::unknown_type))]
    UnknownStateType { state: String, kind: String },

    #[error("State {state} is missing the Type field")]
    #[diagnostic(code(stepbench::factory::missing_type))]
    MissingStateType { state: String },

    #[error("StartAt state '{start_at}' not found in States")]
    #[diagnostic(code(stepbench::factory::start_at))]
    StartAtNotFound { start_at: String },

    #[error("State machine requires a StartAt field")]
    #[diagnostic(code(stepbench::factory::machine_start_at))]
    MachineMissingStartAt,

    #[error("State machine requires a non-empty States object")]
    #[diagnostic(code(stepbench::factory::machine_states))]
    MachineMissingStates,

    #[error("State {state} has Next targeting unknown state '{next}'")]
    #[diagnostic(code(stepbench::factory::unknown_next))]
    NextNotFound { state: String, next: String },

    #[error("State definition for {state} must be an object")]
    #[diagnostic(code(stepbench::factory::state_shape))]
    StateNotObject { state: String },

    /// Several violations on one state, joined into a single message.
    #[error("{}", messages.join("; "))]
    #[diagnostic(code(stepbench::factory::multiple))]
    Multiple { messages: Vec<String> },
}

impl ValidationError {
    /// Collapse a violation list: empty → `None`, one → itself, several →
    /// [`ValidationError::Multiple`].
    #[must_use]
    pub fn collect(mut errors: Vec<ValidationError>) -> Option<ValidationError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(ValidationError::Multiple {
                messages: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}
