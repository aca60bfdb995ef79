//! Pass executor: `Result` (or the input) flows through the postprocess
//! pipeline; no mock is consulted.

use crate::asl::{PassState, State};
use crate::dataflow::strategy_for;

use super::context::ExecutionContext;
use super::{RunError, StepOutcome, transition};

pub(crate) fn execute(
    pass: &PassState,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    let common = state.common();
    let flow = strategy_for(common.query_language);
    let raw_input = ctx.input.clone();
    let effective =
        flow.preprocess(state, &raw_input, &ctx.variables, &ctx.context_object)?;
    let result = match &pass.result {
        Some(result) => result.clone(),
        None => effective.clone(),
    };
    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        result,
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    transition(common, processed.output)
}
