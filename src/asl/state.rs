//! State variants and their shared transform fields.
//!
//! Each variant is a plain struct; per-mode behavioral differences live in
//! the data-flow strategies, not in the tree. The factory guarantees that
//! a constructed tree satisfies the per-variant field rules, so executors
//! can pattern-match without re-validating.

use serde_json::Value;

use crate::types::{QueryLanguage, StateKind};

use super::choice::ChoiceRule;
use super::machine::Branch;

/// A path-valued field that may be explicitly `null` (which selects the
/// empty input `null` for `InputPath`/`OutputPath`, or "discard the
/// result" for `ResultPath`).
#[derive(Clone, Debug, PartialEq)]
pub enum PathValue {
    Null,
    Path(String),
}

impl PathValue {
    #[must_use]
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Path(p) => Some(p),
        }
    }
}

/// Fields shared by every state: transforms, transitions, and recovery.
///
/// The factory populates only the fields legal for the state's variant and
/// effective query language; the rest stay `None`.
#[derive(Clone, Debug, Default)]
pub struct TransformFields {
    pub comment: Option<String>,
    pub query_language: QueryLanguage,
    pub input_path: Option<PathValue>,
    pub output_path: Option<PathValue>,
    pub result_path: Option<PathValue>,
    pub parameters: Option<Value>,
    pub result_selector: Option<Value>,
    pub arguments: Option<Value>,
    pub output: Option<Value>,
    pub assign: Option<Value>,
    pub next: Option<String>,
    pub end: bool,
    pub retry: Vec<RetryRule>,
    pub catch: Vec<CatchRule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterStrategy {
    Full,
}

/// One `Retry` policy entry.
#[derive(Clone, Debug)]
pub struct RetryRule {
    pub error_equals: Vec<String>,
    pub interval_seconds: f64,
    pub max_attempts: u32,
    pub backoff_rate: f64,
    pub max_delay_seconds: Option<f64>,
    pub jitter_strategy: Option<JitterStrategy>,
}

impl Default for RetryRule {
    fn default() -> Self {
        Self {
            error_equals: Vec::new(),
            interval_seconds: 1.0,
            max_attempts: 3,
            backoff_rate: 2.0,
            max_delay_seconds: None,
            jitter_strategy: None,
        }
    }
}

/// One `Catch` routing entry.
#[derive(Clone, Debug)]
pub struct CatchRule {
    pub error_equals: Vec<String>,
    pub next: String,
    pub result_path: Option<PathValue>,
    pub output: Option<Value>,
    pub assign: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct TaskState {
    pub common: TransformFields,
    pub resource: String,
    pub timeout_seconds: Option<f64>,
    pub timeout_seconds_path: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PassState {
    pub common: TransformFields,
    pub result: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct ChoiceState {
    pub common: TransformFields,
    pub choices: Vec<ChoiceRule>,
    pub default: Option<String>,
}

/// Exactly one duration form, enforced by the factory.
#[derive(Clone, Debug)]
pub enum WaitDuration {
    /// A number, or a `{% … %}` expression in JSONata mode.
    Seconds(Value),
    SecondsPath(String),
    /// An RFC 3339 timestamp, or a `{% … %}` expression in JSONata mode.
    Timestamp(Value),
    TimestampPath(String),
}

#[derive(Clone, Debug)]
pub struct WaitState {
    pub common: TransformFields,
    pub duration: WaitDuration,
}

#[derive(Clone, Debug)]
pub struct SucceedState {
    pub common: TransformFields,
}

#[derive(Clone, Debug)]
pub struct FailState {
    pub common: TransformFields,
    pub error: Option<String>,
    pub error_path: Option<String>,
    pub cause: Option<String>,
    pub cause_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapMode {
    Inline,
    Distributed,
}

/// Dataset ingress configuration for a distributed Map.
#[derive(Clone, Debug)]
pub struct ItemReaderConfig {
    pub resource: String,
    /// The raw `ReaderConfig` object (`InputType`, `CSVHeaders`,
    /// `MaxItems`, …), interpreted by the mock engine's item-reader
    /// handler.
    pub reader_config: Value,
    pub parameters: Option<Value>,
    pub arguments: Option<Value>,
}

/// Chunking configuration for a distributed Map.
#[derive(Clone, Debug, Default)]
pub struct ItemBatcherConfig {
    pub max_items_per_batch: Option<u64>,
    pub max_input_bytes_per_batch: Option<u64>,
    pub batch_input: Option<Value>,
}

/// Result egress configuration for a distributed Map.
#[derive(Clone, Debug, Default)]
pub struct ResultWriterConfig {
    pub resource: Option<String>,
    pub writer_config: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct MapState {
    pub common: TransformFields,
    pub mode: MapMode,
    pub items_path: Option<String>,
    pub items: Option<Value>,
    pub item_selector: Option<Value>,
    pub item_processor: Branch,
    pub max_concurrency: Option<u64>,
    pub max_concurrency_path: Option<String>,
    pub tolerated_failure_count: Option<u64>,
    pub tolerated_failure_percentage: Option<f64>,
    pub item_reader: Option<ItemReaderConfig>,
    pub item_batcher: Option<ItemBatcherConfig>,
    pub result_writer: Option<ResultWriterConfig>,
}

impl MapState {
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        self.mode == MapMode::Distributed
    }

    /// Whether any failure tolerance is configured at all. Without it, the
    /// first iteration failure propagates unchanged.
    #[must_use]
    pub fn has_tolerance(&self) -> bool {
        self.tolerated_failure_count.is_some() || self.tolerated_failure_percentage.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ParallelState {
    pub common: TransformFields,
    pub branches: Vec<Branch>,
}

/// The state sum type. Exhaustive matching replaces the runtime
/// `isTask()`-style reflection a dynamic implementation would use.
#[derive(Clone, Debug)]
pub enum State {
    Task(TaskState),
    Pass(PassState),
    Choice(ChoiceState),
    Wait(WaitState),
    Succeed(SucceedState),
    Fail(FailState),
    Map(MapState),
    Parallel(ParallelState),
}

impl State {
    #[must_use]
    pub fn common(&self) -> &TransformFields {
        match self {
            State::Task(s) => &s.common,
            State::Pass(s) => &s.common,
            State::Choice(s) => &s.common,
            State::Wait(s) => &s.common,
            State::Succeed(s) => &s.common,
            State::Fail(s) => &s.common,
            State::Map(s) => &s.common,
            State::Parallel(s) => &s.common,
        }
    }

    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            State::Task(_) => StateKind::Task,
            State::Pass(_) => StateKind::Pass,
            State::Choice(_) => StateKind::Choice,
            State::Wait(_) => StateKind::Wait,
            State::Succeed(_) => StateKind::Succeed,
            State::Fail(_) => StateKind::Fail,
            State::Map(_) => StateKind::Map,
            State::Parallel(_) => StateKind::Parallel,
        }
    }

    #[must_use]
    pub fn query_language(&self) -> QueryLanguage {
        self.common().query_language
    }
}
