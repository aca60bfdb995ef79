//! Map executor: inline and distributed iteration.
//!
//! Items are resolved from `ItemsPath`/`Items` (or the item reader for a
//! distributed Map), optionally batched, and run through the
//! `ItemProcessor` as concurrent sub-machines bounded by
//! `MaxConcurrency`. Outputs are collected in item order regardless of
//! completion order. Inline iterations copy the outer variables;
//! distributed iterations start with an empty scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::debug;

use crate::asl::{ItemBatcherConfig, MapState, State, TransformFields};
use crate::dataflow::{expand_payload_template, jsonata_field, strategy_for};
use crate::engine::Engine;
use crate::errors::{StatesError, names};
use crate::expr::jsonata::JsonataScope;
use crate::expr::jsonpath::{self, EvalScope};

use super::context::{ExecutionContext, MapRun};
use super::{RunError, StepOutcome, transition};

const DISTRIBUTED_DEFAULT_CONCURRENCY: u64 = 1000;

pub(crate) async fn execute(
    engine: &Engine,
    name: &str,
    map: &MapState,
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

    let items = resolve_items(engine, name, map, common, &effective, ctx).await?;
    let total_items = items.len();
    let work_items = match (map.is_distributed(), &map.item_batcher) {
        (true, Some(batcher)) => batch_items(batcher, &items, common, &effective, ctx)?,
        _ => items,
    };
    // Per-sub-execution item counts: a batch's output fans back out to
    // every item it carried, so `|output| == |items|` holds with or
    // without a batcher.
    let batched = map.is_distributed() && map.item_batcher.is_some();
    let batch_sizes: Vec<usize> = if batched {
        work_items
            .iter()
            .map(|work| {
                work.get("Items")
                    .and_then(Value::as_array)
                    .map_or(1, Vec::len)
            })
            .collect()
    } else {
        vec![1; work_items.len()]
    };
    let total = work_items.len();
    let conc = concurrency(map, &effective, ctx, total)?;
    debug!(state = name, items = total, concurrency = conc, "map fan-out");

    // Build one child per iteration up front so the fan-out owns its
    // contexts outright.
    let fanout_cancel = Arc::new(AtomicBool::new(false));
    let mut children = Vec::with_capacity(total);
    for (index, item) in work_items.iter().enumerate() {
        // Distributed processors begin with an empty variable scope.
        let variables = if map.is_distributed() {
            FxHashMap::default()
        } else {
            ctx.variables.clone()
        };
        let mut path = ctx.state_path.clone();
        path.push(name.to_string());
        path.push(index.to_string());
        let mut child = ctx.child(Value::Null, variables, path, Arc::clone(&fanout_cancel));
        child.set_map_item(index, item);
        let sub_input = iteration_input(map, common, &effective, item, ctx, &child)?;
        child.original_input = sub_input.clone();
        child.input = sub_input;
        children.push(child);
    }

    let tolerant = map.has_tolerance();
    let results: Vec<(usize, Result<Value, RunError>, ExecutionContext)> =
        stream::iter(children.into_iter().enumerate().map(|(index, mut child)| {
            let cancel = Arc::clone(&fanout_cancel);
            let processor = &map.item_processor;
            async move {
                // Suspension point: awaiting child completion.
                tokio::task::yield_now().await;
                let outcome = engine.run_branch(processor, &mut child).await;
                if !tolerant && matches!(outcome, Err(RunError::Fault(_))) {
                    cancel.store(true, Ordering::Relaxed);
                }
                (index, outcome, child)
            }
        }))
        .buffered(conc)
        .collect()
        .await;

    let mut outputs = Vec::new();
    let mut failed_items = 0usize;
    let mut first_failure: Option<StatesError> = None;
    for (index, outcome, child) in results {
        ctx.absorb_child(child, name, index);
        match outcome {
            Ok(output) => {
                for _ in 0..batch_sizes[index] {
                    outputs.push(output.clone());
                }
            }
            Err(RunError::Fault(error)) => {
                failed_items += batch_sizes[index];
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
            Err(RunError::Cancelled) => {}
        }
    }
    ctx.map_runs.push(MapRun {
        state: name.to_string(),
        iteration_count: total,
        failed_count: failed_items,
    });

    if let Some(error) = first_failure {
        if !tolerant {
            return Err(RunError::Fault(error));
        }
        let count_exceeded = map
            .tolerated_failure_count
            .is_some_and(|limit| failed_items as u64 > limit);
        let pct_exceeded = map.tolerated_failure_percentage.is_some_and(|limit| {
            (failed_items as f64 / total_items.max(1) as f64) * 100.0 > limit
        });
        if count_exceeded || pct_exceeded {
            return Err(RunError::Fault(StatesError::new(
                names::EXCEED_TOLERATED_FAILURE,
                format!(
                    "Map state '{name}' exceeded its failure tolerance \
                     ({failed_items} of {total_items} item(s) failed)"
                ),
            )));
        }
    }

    let result_value = match (map.is_distributed(), &map.result_writer) {
        (true, Some(writer)) => {
            let resource = writer
                .resource
                .as_deref()
                .unwrap_or("arn:aws:states:::s3:putObject");
            let config = writer.writer_config.clone().unwrap_or(Value::Null);
            let details = engine.mocks().write_results(name, resource, &config, &outputs);
            json!({
                "ProcessedItemCount": outputs.len(),
                "FailedItemCount": failed_items,
                "ResultWriterDetails": details,
            })
        }
        _ => Value::Array(outputs),
    };

    let processed = flow.postprocess(
        state,
        &raw_input,
        &effective,
        result_value,
        &ctx.variables,
        &ctx.context_object,
    )?;
    ctx.commit_assignments(processed.assignments);
    transition(common, processed.output)
}

async fn resolve_items(
    engine: &Engine,
    name: &str,
    map: &MapState,
    common: &TransformFields,
    effective: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, StatesError> {
    if map.is_distributed() {
        if let Some(reader) = &map.item_reader {
            // The Map input configures the reader; items come from the
            // mock layer's dataset.
            tokio::task::yield_now().await;
            return engine.mocks().resolve_item_reader(name, reader).await;
        }
    }
    if common.query_language.is_jsonata() {
        let template = map.items.as_ref().ok_or_else(|| {
            StatesError::runtime(format!("Map state '{name}' requires Items in JSONata mode"))
        })?;
        let states = json!({ "input": effective, "context": ctx.context_object });
        let value = jsonata_field(template, &JsonataScope::new(states, &ctx.variables))?;
        return value.as_array().cloned().ok_or_else(|| {
            StatesError::runtime(format!("Map state '{name}' Items must evaluate to an array"))
        });
    }
    let scope = EvalScope::new(effective, &ctx.context_object, &ctx.variables);
    let selected = match &map.items_path {
        None => effective.clone(),
        Some(path) if path == "$" => effective.clone(),
        Some(path) => jsonpath::evaluate(path, &scope)?,
    };
    selected.as_array().cloned().ok_or_else(|| {
        StatesError::runtime(format!("Map state '{name}' input is not an array"))
    })
}

/// Shape one iteration's input via `ItemSelector` (or its legacy
/// `Parameters` spelling), with `$$.Map.Item.{Index,Value}` bound.
fn iteration_input(
    map: &MapState,
    common: &TransformFields,
    effective: &Value,
    item: &Value,
    parent: &ExecutionContext,
    child: &ExecutionContext,
) -> Result<Value, StatesError> {
    let Some(selector) = &map.item_selector else {
        return Ok(item.clone());
    };
    if common.query_language.is_jsonata() {
        let states = json!({ "input": effective, "context": child.context_object });
        jsonata_field(selector, &JsonataScope::new(states, &parent.variables))
    } else {
        let scope = EvalScope::new(effective, &child.context_object, &parent.variables);
        expand_payload_template(selector, &scope)
    }
}

/// Chunk items per `MaxItemsPerBatch`/`MaxInputBytesPerBatch`, wrapping
/// each chunk as `{ BatchInput?, Items }`.
fn batch_items(
    batcher: &ItemBatcherConfig,
    items: &[Value],
    common: &TransformFields,
    effective: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, StatesError> {
    let batch_input = match &batcher.batch_input {
        None => None,
        Some(template) => Some(if common.query_language.is_jsonata() {
            let states = json!({ "input": effective, "context": ctx.context_object });
            jsonata_field(template, &JsonataScope::new(states, &ctx.variables))?
        } else {
            let scope = EvalScope::new(effective, &ctx.context_object, &ctx.variables);
            expand_payload_template(template, &scope)?
        }),
    };

    let max_count = batcher.max_items_per_batch.map(|n| n as usize);
    let max_bytes = batcher.max_input_bytes_per_batch.map(|n| n as usize);
    let mut batches: Vec<Vec<Value>> = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    let mut current_bytes = 0usize;
    for item in items {
        let size = serde_json::to_string(item).map(|s| s.len()).unwrap_or(0);
        let over_count = max_count.is_some_and(|limit| current.len() + 1 > limit);
        let over_bytes =
            max_bytes.is_some_and(|limit| !current.is_empty() && current_bytes + size > limit);
        if over_count || over_bytes {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(item.clone());
        current_bytes += size;
    }
    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches
        .into_iter()
        .map(|chunk| {
            let mut batch = serde_json::Map::new();
            if let Some(bi) = &batch_input {
                batch.insert("BatchInput".to_string(), bi.clone());
            }
            batch.insert("Items".to_string(), Value::Array(chunk));
            Value::Object(batch)
        })
        .collect())
}

/// `MaxConcurrency` 0 means unbounded; distributed Maps default to 1000.
fn concurrency(
    map: &MapState,
    effective: &Value,
    ctx: &ExecutionContext,
    total: usize,
) -> Result<usize, StatesError> {
    let configured = if let Some(path) = &map.max_concurrency_path {
        let scope = EvalScope::new(effective, &ctx.context_object, &ctx.variables);
        jsonpath::evaluate(path, &scope)?
            .as_u64()
            .ok_or_else(|| {
                StatesError::runtime("MaxConcurrencyPath must reference a non-negative integer")
            })?
    } else if let Some(limit) = map.max_concurrency {
        limit
    } else if map.is_distributed() {
        DISTRIBUTED_DEFAULT_CONCURRENCY
    } else {
        0
    };
    let unbounded = total.max(1);
    Ok(if configured == 0 {
        unbounded
    } else {
        (configured as usize).min(unbounded)
    })
}
