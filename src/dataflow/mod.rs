//! Pre/post-processing strategies wrapping every state executor.
//!
//! The two query languages carry parallel implementations of the same
//! contract: `preprocess` shapes the state's effective input
//! (`InputPath`/`Parameters` or `Arguments`), `postprocess` shapes its
//! output (`ResultSelector`/`ResultPath`/`OutputPath` or `Output`) and
//! computes `Assign`, and `catch_output` shapes the error payload routed
//! to a `Catch` handler.

mod jsonata_flow;
mod jsonpath_flow;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::asl::{CatchRule, State};
use crate::errors::StatesError;
use crate::types::QueryLanguage;

pub(crate) use jsonata_flow::{
    JsonataFlow, evaluate_field as jsonata_field, expand_assignments as jsonata_assignments,
};
pub(crate) use jsonpath_flow::{
    JsonPathFlow, expand_assignments as jsonpath_assignments, expand_payload_template,
};

/// Output of a postprocess pass: the state output plus the variable
/// updates from `Assign`. Assignments are computed against the pre-assign
/// snapshot and committed atomically by the caller.
#[derive(Debug, Default)]
pub(crate) struct Postprocessed {
    pub output: Value,
    pub assignments: FxHashMap<String, Value>,
}

pub(crate) trait DataFlow: Send + Sync {
    /// Shape the state's effective input from its raw input.
    fn preprocess(
        &self,
        state: &State,
        input: &Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Value, StatesError>;

    /// Shape the state's output from the task result and compute `Assign`.
    fn postprocess(
        &self,
        state: &State,
        raw_input: &Value,
        effective_input: &Value,
        result: Value,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Postprocessed, StatesError>;

    /// Shape the `{Error, Cause}` payload for a matched `Catch` rule.
    fn catch_output(
        &self,
        rule: &CatchRule,
        raw_input: &Value,
        error: &StatesError,
        variables: &FxHashMap<String, Value>,
        context_object: &Value,
    ) -> Result<Value, StatesError>;
}

static JSONPATH_FLOW: JsonPathFlow = JsonPathFlow;
static JSONATA_FLOW: JsonataFlow = JsonataFlow;

pub(crate) fn strategy_for(lang: QueryLanguage) -> &'static dyn DataFlow {
    match lang {
        QueryLanguage::JsonPath => &JSONPATH_FLOW,
        QueryLanguage::Jsonata => &JSONATA_FLOW,
    }
}
