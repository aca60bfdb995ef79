//! The mock layer: deterministic stand-ins for every external task.
//!
//! Mocks are read-only configuration selected by state name. The engine
//! owns the only mutable pieces: per-state call counters (shared by
//! concurrent iterations, updated under a lock) and the result-writer
//! call log. `dataFile` references resolve through an injected
//! [`DatasetLoader`] collaborator, so the core itself performs no I/O.

mod item_reader;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::asl::ItemReaderConfig;
use crate::errors::{StatesError, names};
use crate::utils::json_ext::is_deep_subset;

/// Policy for a stateful mock called past the end of its sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExhaustPolicy {
    /// Keep returning the final entry.
    #[default]
    RepeatLast,
    /// Raise `MockNotFound`.
    Error,
}

/// The body of one mock reply: a response value or a typed error.
#[derive(Clone, Debug)]
pub enum MockReplyBody {
    Response(Value),
    Error { error: String, cause: String },
}

/// One mock reply, optionally charging virtual latency so per-task
/// timeouts are exercisable.
#[derive(Clone, Debug)]
pub struct MockReply {
    pub body: MockReplyBody,
    pub delay_seconds: Option<f64>,
}

impl MockReply {
    #[must_use]
    pub fn response(value: Value) -> Self {
        Self {
            body: MockReplyBody::Response(value),
            delay_seconds: None,
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            body: MockReplyBody::Error {
                error: error.into(),
                cause: cause.into(),
            },
            delay_seconds: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }
}

/// One entry of a conditional mock: either a `when` matcher or the
/// terminal `default`.
#[derive(Clone, Debug)]
pub struct ConditionalRule {
    /// Deep structural subset of the task input.
    pub when: Option<Value>,
    pub is_default: bool,
    pub reply: MockReply,
}

/// Dataset source for an `itemReader` mock.
#[derive(Clone, Debug, Default)]
pub struct ItemReaderMock {
    /// Inline dataset.
    pub data: Option<Value>,
    /// External dataset resolved through the [`DatasetLoader`].
    pub data_file: Option<String>,
}

#[derive(Clone, Debug)]
pub enum MockKind {
    Fixed(MockReply),
    Conditional { conditions: Vec<ConditionalRule> },
    Stateful {
        responses: Vec<MockReply>,
        on_exhausted: Option<ExhaustPolicy>,
    },
    Error { error: String, cause: String },
    ItemReader(ItemReaderMock),
    ResultWriter { response: Option<Value> },
}

/// A mock bound to the state it stands in for.
#[derive(Clone, Debug)]
pub struct StateMock {
    pub state: String,
    pub kind: MockKind,
}

impl StateMock {
    pub fn fixed(state: impl Into<String>, response: Value) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::Fixed(MockReply::response(response)),
        }
    }

    pub fn error(
        state: impl Into<String>,
        error: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::Error {
                error: error.into(),
                cause: cause.into(),
            },
        }
    }

    pub fn conditional(state: impl Into<String>, conditions: Vec<ConditionalRule>) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::Conditional { conditions },
        }
    }

    pub fn stateful(state: impl Into<String>, responses: Vec<MockReply>) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::Stateful {
                responses,
                on_exhausted: None,
            },
        }
    }

    pub fn item_reader(state: impl Into<String>, reader: ItemReaderMock) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::ItemReader(reader),
        }
    }

    pub fn result_writer(state: impl Into<String>, response: Option<Value>) -> Self {
        Self {
            state: state.into(),
            kind: MockKind::ResultWriter { response },
        }
    }
}

/// The full mock configuration for a workflow under test.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    pub mocks: Vec<StateMock>,
}

impl MockConfig {
    #[must_use]
    pub fn new(mocks: Vec<StateMock>) -> Self {
        Self { mocks }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("dataset file not found: {file}")]
    #[diagnostic(code(stepbench::loader::not_found))]
    NotFound { file: String },

    #[error("dataset file {file} could not be parsed: {detail}")]
    #[diagnostic(code(stepbench::loader::parse))]
    Parse { file: String, detail: String },
}

/// Collaborator resolving `dataFile` references. The parsing of CSV/JSONL
/// files into values happens behind this seam; the core only validates
/// the handed-in structure.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, base_path: Option<&Path>, file: &str) -> Result<Value, LoaderError>;
}

/// In-memory loader keyed by file name. The default collaborator in
/// tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLoader {
    files: FxHashMap<String, Value>,
}

impl InMemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, data: Value) -> Self {
        self.files.insert(name.into(), data);
        self
    }
}

#[async_trait]
impl DatasetLoader for InMemoryLoader {
    async fn load(&self, _base_path: Option<&Path>, file: &str) -> Result<Value, LoaderError> {
        self.files
            .get(file)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound {
                file: file.to_string(),
            })
    }
}

/// A resolved mock response handed to the Task executor.
#[derive(Clone, Debug)]
pub struct MockResponse {
    pub value: Value,
    pub delay_seconds: Option<f64>,
}

/// One recorded `ResultWriter` invocation.
#[derive(Clone, Debug)]
pub struct WriterCall {
    pub state: String,
    pub resource: String,
    pub config: Value,
    pub results: Vec<Value>,
}

/// Resolves `(state, input)` pairs to deterministic responses.
pub struct MockEngine {
    mocks: FxHashMap<String, MockKind>,
    counters: Mutex<FxHashMap<String, usize>>,
    writer_calls: Mutex<Vec<WriterCall>>,
    base_path: Option<PathBuf>,
    loader: Option<Arc<dyn DatasetLoader>>,
    exhaust_default: ExhaustPolicy,
}

impl MockEngine {
    #[must_use]
    pub fn new(config: &MockConfig) -> Self {
        let mocks = config
            .mocks
            .iter()
            .map(|m| (m.state.clone(), m.kind.clone()))
            .collect();
        Self {
            mocks,
            counters: Mutex::new(FxHashMap::default()),
            writer_calls: Mutex::new(Vec::new()),
            base_path: None,
            loader: None,
            exhaust_default: ExhaustPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn DatasetLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_exhaust_default(mut self, policy: ExhaustPolicy) -> Self {
        self.exhaust_default = policy;
        self
    }

    /// A derived engine with per-case overrides shadowing the shared
    /// mocks by state name. Counters and the writer log start fresh.
    #[must_use]
    pub fn with_overrides(&self, overrides: &[StateMock]) -> Self {
        let mut mocks = self.mocks.clone();
        for m in overrides {
            mocks.insert(m.state.clone(), m.kind.clone());
        }
        Self {
            mocks,
            counters: Mutex::new(FxHashMap::default()),
            writer_calls: Mutex::new(Vec::new()),
            base_path: self.base_path.clone(),
            loader: self.loader.clone(),
            exhaust_default: self.exhaust_default,
        }
    }

    /// How many times the given state's mock has been called.
    #[must_use]
    pub fn call_count(&self, state: &str) -> usize {
        self.counters
            .lock()
            .expect("counter lock")
            .get(state)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counters.lock().expect("counter lock").clear();
        self.writer_calls.lock().expect("writer lock").clear();
    }

    #[must_use]
    pub fn writer_calls(&self) -> Vec<WriterCall> {
        self.writer_calls.lock().expect("writer lock").clone()
    }

    /// Resolve a task invocation. Bumps the per-state call counter.
    pub fn resolve(&self, state: &str, input: &Value) -> Result<MockResponse, StatesError> {
        let call_index = {
            let mut counters = self.counters.lock().expect("counter lock");
            let slot = counters.entry(state.to_string()).or_insert(0);
            let index = *slot;
            *slot += 1;
            index
        };
        debug!(state, call_index, "resolving mock");
        let Some(kind) = self.mocks.get(state) else {
            return Err(StatesError::mock_not_found(state));
        };
        match kind {
            MockKind::Fixed(reply) => reply_to_response(reply),
            MockKind::Error { error, cause } => {
                Err(StatesError::new(error.clone(), cause.clone()))
            }
            MockKind::Conditional { conditions } => {
                for rule in conditions {
                    let matched = match &rule.when {
                        Some(when) => is_deep_subset(when, input),
                        None => rule.is_default,
                    };
                    if matched {
                        return reply_to_response(&rule.reply);
                    }
                }
                Err(StatesError::new(
                    names::MOCK_NOT_FOUND,
                    format!("No conditional mock matched the input for state '{state}'"),
                ))
            }
            MockKind::Stateful {
                responses,
                on_exhausted,
            } => {
                if responses.is_empty() {
                    return Err(StatesError::mock_not_found(state));
                }
                if call_index < responses.len() {
                    return reply_to_response(&responses[call_index]);
                }
                match on_exhausted.unwrap_or(self.exhaust_default) {
                    ExhaustPolicy::RepeatLast => {
                        reply_to_response(responses.last().expect("non-empty"))
                    }
                    ExhaustPolicy::Error => Err(StatesError::new(
                        names::MOCK_NOT_FOUND,
                        format!(
                            "Stateful mock for state '{state}' exhausted after {} call(s)",
                            responses.len()
                        ),
                    )),
                }
            }
            MockKind::ItemReader(_) | MockKind::ResultWriter { .. } => Err(StatesError::new(
                names::MOCK_NOT_FOUND,
                format!("Mock for state '{state}' is not a task mock"),
            )),
        }
    }

    /// Resolve a distributed Map's item reader to its validated dataset.
    pub async fn resolve_item_reader(
        &self,
        state: &str,
        reader: &ItemReaderConfig,
    ) -> Result<Vec<Value>, StatesError> {
        let mock = match self.mocks.get(state) {
            Some(MockKind::ItemReader(mock)) => mock.clone(),
            Some(_) => {
                return Err(StatesError::new(
                    names::MOCK_NOT_FOUND,
                    format!("Mock for state '{state}' is not an itemReader mock"),
                ));
            }
            None => ItemReaderMock::default(),
        };
        let raw = match (&mock.data, &mock.data_file) {
            (Some(data), _) => Some(data.clone()),
            (None, Some(file)) => {
                let loader = self.loader.as_ref().ok_or_else(|| {
                    StatesError::runtime(format!(
                        "itemReader mock for state '{state}' references dataFile '{file}' \
                         but no dataset loader is configured"
                    ))
                })?;
                Some(
                    loader
                        .load(self.base_path.as_deref(), file)
                        .await
                        .map_err(|e| StatesError::runtime(e.to_string()))?,
                )
            }
            (None, None) => None,
        };
        item_reader::materialize(reader, raw)
    }

    /// Invoke the result-writer hook, recording the call and returning
    /// the `ResultWriterDetails` value.
    pub fn write_results(
        &self,
        state: &str,
        resource: &str,
        config: &Value,
        results: &[Value],
    ) -> Value {
        self.writer_calls.lock().expect("writer lock").push(WriterCall {
            state: state.to_string(),
            resource: resource.to_string(),
            config: config.clone(),
            results: results.to_vec(),
        });
        match self.mocks.get(state) {
            Some(MockKind::ResultWriter {
                response: Some(response),
            }) => response.clone(),
            _ => json!({
                "Bucket": "stepbench-results",
                "Key": format!("results/{state}.json"),
            }),
        }
    }
}

fn reply_to_response(reply: &MockReply) -> Result<MockResponse, StatesError> {
    match &reply.body {
        MockReplyBody::Response(value) => Ok(MockResponse {
            value: value.clone(),
            delay_seconds: reply.delay_seconds,
        }),
        MockReplyBody::Error { error, cause } => {
            Err(StatesError::new(error.clone(), cause.clone()))
        }
    }
}
