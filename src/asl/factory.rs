//! The validating factory: raw definition object → typed [`StateMachine`].
//!
//! The factory is a pure function. It computes each state's effective
//! query language (state overrides enclosing Map, Map overrides the
//! machine, Parallel does *not* propagate its own override into its
//! branches), applies the per-variant field rules, and either returns an
//! immutable tree or a [`ValidationError`] whose message is exact and
//! stable. When one state carries several violations they are all
//! reported in a single message.

use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::expr::jsonata;
use crate::types::{QueryLanguage, StateKind};

use super::choice::{ChoiceRule, ChoiceTest, ParsedOperator, parse_operator};
use super::machine::{Branch, StateMachine, StateSet};
use super::state::{
    CatchRule, ChoiceState, FailState, ItemBatcherConfig, ItemReaderConfig, JitterStrategy,
    MapMode, MapState, ParallelState, PassState, PathValue, ResultWriterConfig, RetryRule, State,
    SucceedState, TaskState, TransformFields, WaitDuration, WaitState,
};

/// Compile a raw definition into a typed, validated state machine.
pub fn compile(raw: &Value) -> Result<StateMachine, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or(ValidationError::MachineMissingStartAt)?;
    let machine_lang = obj
        .get("QueryLanguage")
        .and_then(Value::as_str)
        .map(QueryLanguage::from)
        .unwrap_or_default();
    let start_at = obj
        .get("StartAt")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MachineMissingStartAt)?
        .to_string();
    let states_raw = obj
        .get("States")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or(ValidationError::MachineMissingStates)?;

    let factory = Factory { machine_lang };
    let states = factory.compile_states(states_raw, machine_lang)?;
    if !states.contains(&start_at) {
        return Err(ValidationError::StartAtNotFound { start_at });
    }
    Ok(StateMachine {
        start_at,
        states,
        query_language: machine_lang,
        timeout_seconds: obj.get("TimeoutSeconds").and_then(Value::as_f64),
        comment: obj
            .get("Comment")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

struct Factory {
    machine_lang: QueryLanguage,
}

impl Factory {
    fn compile_states(
        &self,
        raw: &Map<String, Value>,
        inherited: QueryLanguage,
    ) -> Result<StateSet, ValidationError> {
        let mut entries = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let obj = value
                .as_object()
                .ok_or_else(|| ValidationError::StateNotObject {
                    state: name.clone(),
                })?;
            entries.push((name.clone(), self.compile_state(name, obj, inherited)?));
        }
        let set = StateSet::new(entries);
        for (name, state) in set.iter() {
            self.check_targets(name, state, &set)?;
        }
        Ok(set)
    }

    fn check_targets(
        &self,
        name: &str,
        state: &State,
        set: &StateSet,
    ) -> Result<(), ValidationError> {
        let not_found = |next: &str| ValidationError::NextNotFound {
            state: name.to_string(),
            next: next.to_string(),
        };
        let common = state.common();
        if let Some(next) = &common.next {
            if !set.contains(next) {
                return Err(not_found(next));
            }
        }
        for rule in &common.catch {
            if !set.contains(&rule.next) {
                return Err(not_found(&rule.next));
            }
        }
        if let State::Choice(choice) = state {
            for rule in &choice.choices {
                if !set.contains(&rule.next) {
                    return Err(not_found(&rule.next));
                }
            }
            if let Some(default) = &choice.default {
                if !set.contains(default) {
                    return Err(not_found(default));
                }
            }
        }
        Ok(())
    }

    fn compile_state(
        &self,
        name: &str,
        obj: &Map<String, Value>,
        inherited: QueryLanguage,
    ) -> Result<State, ValidationError> {
        let lang = obj
            .get("QueryLanguage")
            .and_then(Value::as_str)
            .map(QueryLanguage::from)
            .unwrap_or(inherited);
        let kind_str = obj
            .get("Type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingStateType {
                state: name.to_string(),
            })?;
        let kind =
            StateKind::parse(kind_str).ok_or_else(|| ValidationError::UnknownStateType {
                state: name.to_string(),
                kind: kind_str.to_string(),
            })?;

        let mut violations = Vec::new();
        self.check_fields(name, obj, kind, lang, &mut violations);
        if let Some(err) = ValidationError::collect(std::mem::take(&mut violations)) {
            return Err(err);
        }
        self.build_state(name, obj, kind, lang)
    }

    /// Apply the per-variant field-presence table, collecting every
    /// violation for the state.
    fn check_fields(
        &self,
        name: &str,
        obj: &Map<String, Value>,
        kind: StateKind,
        lang: QueryLanguage,
        violations: &mut Vec<ValidationError>,
    ) {
        let has = |field: &str| obj.contains_key(field);

        if kind.is_terminal() {
            if has("Next") {
                violations.push(ValidationError::TerminalWithNext {
                    state: name.to_string(),
                });
            }
            for field in ["End", "Retry", "Catch"] {
                if has(field) {
                    violations.push(ValidationError::TerminalUnsupportedField {
                        state: name.to_string(),
                        field,
                    });
                }
            }
        } else if kind != StateKind::Choice {
            let end = obj.get("End").and_then(Value::as_bool).unwrap_or(false);
            if has("Next") && end {
                violations.push(ValidationError::NextWithEnd {
                    state: name.to_string(),
                });
            }
            if !has("Next") && !end {
                violations.push(ValidationError::MissingTransition {
                    state: name.to_string(),
                });
            }
        }

        match kind {
            StateKind::Choice => {
                for field in [
                    "InputPath",
                    "OutputPath",
                    "Parameters",
                    "ResultSelector",
                    "ResultPath",
                    "Arguments",
                    "Output",
                ] {
                    if has(field) {
                        violations.push(ValidationError::ChoiceUnsupportedField { field });
                    }
                }
                match obj.get("Choices").and_then(Value::as_array) {
                    Some(choices) if !choices.is_empty() => {
                        for rule in choices {
                            self.check_choice_rule(rule, lang, true, violations);
                        }
                    }
                    _ => violations.push(ValidationError::ChoiceRequiresRules),
                }
            }
            _ if lang.is_jsonata() => {
                self.check_jsonata_fields(name, obj, kind, violations);
            }
            _ => {
                self.check_jsonpath_fields(obj, kind, violations);
            }
        }

        match kind {
            StateKind::Task => {
                if !has("Resource") {
                    violations.push(ValidationError::TaskRequiresResource);
                }
            }
            StateKind::Wait => {
                let present = ["Seconds", "SecondsPath", "Timestamp", "TimestampPath"]
                    .into_iter()
                    .filter(|f| obj.contains_key(*f))
                    .count();
                if present != 1 {
                    violations.push(ValidationError::WaitCardinality);
                }
            }
            StateKind::Fail => {
                if has("Cause") && has("CausePath") {
                    violations.push(ValidationError::FailBothCause);
                }
                if has("Error") && has("ErrorPath") {
                    violations.push(ValidationError::FailBothError);
                }
            }
            StateKind::Map => {
                match obj.get("ItemProcessor").or_else(|| obj.get("Iterator")) {
                    Some(processor) => {
                        let processor = processor.as_object();
                        if processor.is_none_or(|p| !p.contains_key("StartAt")) {
                            violations.push(ValidationError::ProcessorRequiresStartAt);
                        }
                    }
                    None => violations.push(ValidationError::MapRequiresProcessor),
                }
            }
            StateKind::Parallel => {
                let ok = obj
                    .get("Branches")
                    .and_then(Value::as_array)
                    .is_some_and(|b| !b.is_empty());
                if !ok {
                    violations.push(ValidationError::ParallelRequiresBranches);
                }
            }
            _ => {}
        }
    }

    fn check_jsonata_fields(
        &self,
        _name: &str,
        obj: &Map<String, Value>,
        kind: StateKind,
        violations: &mut Vec<ValidationError>,
    ) {
        let has = |field: &str| obj.contains_key(field);
        if has("Parameters") {
            violations.push(ValidationError::ParametersInJsonata);
        }
        if has("InputPath") {
            violations.push(ValidationError::InputPathInJsonata);
        }
        if has("OutputPath") {
            violations.push(ValidationError::PathFieldInJsonata {
                field: "OutputPath",
                base: "Output",
            });
        }
        if has("ResultPath") {
            violations.push(ValidationError::ResultPathInJsonata);
        }
        if has("ResultSelector") {
            violations.push(ValidationError::ResultSelectorInJsonata);
        }
        match kind {
            StateKind::Task => {
                let resource = obj.get("Resource").and_then(Value::as_str).unwrap_or("");
                if resource.contains(":::") && !has("Arguments") {
                    violations.push(ValidationError::ArgumentsRequired {
                        resource: resource.to_string(),
                    });
                }
            }
            StateKind::Pass => {
                if has("Arguments") {
                    violations.push(ValidationError::PassArguments);
                }
            }
            StateKind::Wait => {
                if has("SecondsPath") {
                    violations.push(ValidationError::PathFieldInJsonata {
                        field: "SecondsPath",
                        base: "Seconds",
                    });
                }
                if has("TimestampPath") {
                    violations.push(ValidationError::PathFieldInJsonata {
                        field: "TimestampPath",
                        base: "Timestamp",
                    });
                }
            }
            StateKind::Map => {
                if has("ItemsPath") {
                    violations.push(ValidationError::PathFieldInJsonata {
                        field: "ItemsPath",
                        base: "Items",
                    });
                }
            }
            _ => {}
        }
    }

    fn check_jsonpath_fields(
        &self,
        obj: &Map<String, Value>,
        kind: StateKind,
        violations: &mut Vec<ValidationError>,
    ) {
        let has = |field: &str| obj.contains_key(field);
        if has("Arguments") {
            violations.push(match kind {
                StateKind::Pass => ValidationError::PassArguments,
                _ => ValidationError::FieldInJsonPath {
                    field: "Arguments",
                    base: "Parameters",
                },
            });
        }
        if has("Output") {
            violations.push(ValidationError::FieldInJsonPath {
                field: "Output",
                base: "OutputPath",
            });
        }
        if kind == StateKind::Map && has("Items") {
            violations.push(ValidationError::FieldInJsonPath {
                field: "Items",
                base: "ItemsPath",
            });
        }
    }

    fn check_choice_rule(
        &self,
        raw: &Value,
        lang: QueryLanguage,
        top_level: bool,
        violations: &mut Vec<ValidationError>,
    ) {
        let Some(obj) = raw.as_object() else {
            violations.push(ValidationError::ChoiceRuleMissingOperator);
            return;
        };
        if top_level && !obj.contains_key("Next") {
            violations.push(ValidationError::ChoiceRuleMissingNext);
        }
        if lang.is_jsonata() {
            if ["Variable", "And", "Or", "Not"]
                .iter()
                .any(|f| obj.contains_key(*f))
            {
                violations.push(ValidationError::JsonPathChoiceInJsonata);
                return;
            }
            match obj.get("Condition") {
                Some(Value::String(cond)) if jsonata::is_wrapped(cond) => {}
                Some(Value::Bool(_)) => {}
                _ => violations.push(ValidationError::ChoiceConditionNotWrapped),
            }
            return;
        }
        if let Some(Value::Array(rules)) = obj.get("And") {
            for rule in rules {
                self.check_choice_rule(rule, lang, false, violations);
            }
            return;
        }
        if let Some(Value::Array(rules)) = obj.get("Or") {
            for rule in rules {
                self.check_choice_rule(rule, lang, false, violations);
            }
            return;
        }
        if let Some(inner) = obj.get("Not") {
            self.check_choice_rule(inner, lang, false, violations);
            return;
        }
        if !obj.contains_key("Variable") {
            violations.push(ValidationError::ChoiceRuleMissingVariable);
            return;
        }
        if !obj.keys().any(|k| parse_operator(k).is_some()) {
            violations.push(ValidationError::ChoiceRuleMissingOperator);
        }
    }

    /// Build the typed state. Field legality has already been checked.
    fn build_state(
        &self,
        name: &str,
        obj: &Map<String, Value>,
        kind: StateKind,
        lang: QueryLanguage,
    ) -> Result<State, ValidationError> {
        let common = build_common(obj, lang)?;
        Ok(match kind {
            StateKind::Task => State::Task(TaskState {
                common,
                resource: obj
                    .get("Resource")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timeout_seconds: obj.get("TimeoutSeconds").and_then(Value::as_f64),
                timeout_seconds_path: string_field(obj, "TimeoutSecondsPath"),
            }),
            StateKind::Pass => State::Pass(PassState {
                common,
                result: obj.get("Result").cloned(),
            }),
            StateKind::Choice => State::Choice(ChoiceState {
                common,
                choices: obj
                    .get("Choices")
                    .and_then(Value::as_array)
                    .map(|rules| {
                        rules
                            .iter()
                            .filter_map(|rule| build_choice_rule(rule, lang))
                            .collect()
                    })
                    .unwrap_or_default(),
                default: string_field(obj, "Default"),
            }),
            StateKind::Wait => State::Wait(WaitState {
                common,
                duration: build_wait_duration(obj),
            }),
            StateKind::Succeed => State::Succeed(SucceedState { common }),
            StateKind::Fail => State::Fail(FailState {
                common,
                error: string_field(obj, "Error"),
                error_path: string_field(obj, "ErrorPath"),
                cause: string_field(obj, "Cause"),
                cause_path: string_field(obj, "CausePath"),
            }),
            StateKind::Map => self.build_map(obj, common, lang)?,
            StateKind::Parallel => {
                let mut branches = Vec::new();
                if let Some(raw_branches) = obj.get("Branches").and_then(Value::as_array) {
                    for raw_branch in raw_branches {
                        // Branches inherit the machine-level language, not
                        // the Parallel state's own override.
                        branches.push(self.build_branch(name, raw_branch, self.machine_lang)?);
                    }
                }
                State::Parallel(ParallelState { common, branches })
            }
        })
    }

    fn build_map(
        &self,
        obj: &Map<String, Value>,
        common: TransformFields,
        lang: QueryLanguage,
    ) -> Result<State, ValidationError> {
        let processor_raw = obj
            .get("ItemProcessor")
            .or_else(|| obj.get("Iterator"))
            .ok_or(ValidationError::MapRequiresProcessor)?;
        let mode = processor_raw
            .get("ProcessorConfig")
            .and_then(|c| c.get("Mode"))
            .and_then(Value::as_str)
            .map_or(MapMode::Inline, |m| {
                if m == "DISTRIBUTED" {
                    MapMode::Distributed
                } else {
                    MapMode::Inline
                }
            });
        let item_processor = self.build_branch("ItemProcessor", processor_raw, lang)?;

        let item_reader = obj.get("ItemReader").map(|reader| ItemReaderConfig {
            resource: reader
                .get("Resource")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reader_config: reader
                .get("ReaderConfig")
                .cloned()
                .unwrap_or(Value::Object(Map::new())),
            parameters: reader.get("Parameters").cloned(),
            arguments: reader.get("Arguments").cloned(),
        });
        let item_batcher = obj.get("ItemBatcher").map(|batcher| ItemBatcherConfig {
            max_items_per_batch: batcher.get("MaxItemsPerBatch").and_then(Value::as_u64),
            max_input_bytes_per_batch: batcher
                .get("MaxInputBytesPerBatch")
                .and_then(Value::as_u64),
            batch_input: batcher.get("BatchInput").cloned(),
        });
        let result_writer = obj.get("ResultWriter").map(|writer| ResultWriterConfig {
            resource: writer
                .get("Resource")
                .and_then(Value::as_str)
                .map(str::to_string),
            writer_config: writer
                .get("WriterConfig")
                .or_else(|| writer.get("Parameters"))
                .or_else(|| writer.get("Arguments"))
                .cloned(),
        });

        Ok(State::Map(MapState {
            common,
            mode,
            items_path: string_field(obj, "ItemsPath"),
            items: obj.get("Items").cloned(),
            item_selector: obj
                .get("ItemSelector")
                .or_else(|| obj.get("Parameters"))
                .cloned(),
            item_processor,
            max_concurrency: obj.get("MaxConcurrency").and_then(Value::as_u64),
            max_concurrency_path: string_field(obj, "MaxConcurrencyPath"),
            tolerated_failure_count: obj.get("ToleratedFailureCount").and_then(Value::as_u64),
            tolerated_failure_percentage: obj
                .get("ToleratedFailurePercentage")
                .and_then(Value::as_f64),
            item_reader,
            item_batcher,
            result_writer,
        }))
    }

    fn build_branch(
        &self,
        _context: &str,
        raw: &Value,
        inherited: QueryLanguage,
    ) -> Result<Branch, ValidationError> {
        let obj = raw
            .as_object()
            .ok_or(ValidationError::ProcessorRequiresStartAt)?;
        let start_at = obj
            .get("StartAt")
            .and_then(Value::as_str)
            .ok_or(ValidationError::ProcessorRequiresStartAt)?
            .to_string();
        let states_raw = obj
            .get("States")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .ok_or(ValidationError::MachineMissingStates)?;
        let states = self.compile_states(states_raw, inherited)?;
        if !states.contains(&start_at) {
            return Err(ValidationError::StartAtNotFound { start_at });
        }
        Ok(Branch { start_at, states })
    }
}

fn string_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}

fn path_field(obj: &Map<String, Value>, field: &'static str) -> Result<Option<PathValue>, ValidationError> {
    match obj.get(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(PathValue::Null)),
        Some(Value::String(s)) => Ok(Some(PathValue::Path(s.clone()))),
        Some(_) => Err(ValidationError::InvalidFieldType { field }),
    }
}

fn build_common(
    obj: &Map<String, Value>,
    lang: QueryLanguage,
) -> Result<TransformFields, ValidationError> {
    Ok(TransformFields {
        comment: string_field(obj, "Comment"),
        query_language: lang,
        input_path: path_field(obj, "InputPath")?,
        output_path: path_field(obj, "OutputPath")?,
        result_path: path_field(obj, "ResultPath")?,
        parameters: obj.get("Parameters").cloned(),
        result_selector: obj.get("ResultSelector").cloned(),
        arguments: obj.get("Arguments").cloned(),
        output: obj.get("Output").cloned(),
        assign: obj.get("Assign").cloned(),
        next: string_field(obj, "Next"),
        end: obj.get("End").and_then(Value::as_bool).unwrap_or(false),
        retry: obj
            .get("Retry")
            .and_then(Value::as_array)
            .map(|rules| rules.iter().map(build_retry_rule).collect())
            .unwrap_or_default(),
        catch: obj
            .get("Catch")
            .and_then(Value::as_array)
            .map(|rules| rules.iter().filter_map(build_catch_rule).collect())
            .unwrap_or_default(),
    })
}

fn error_equals(raw: &Value) -> Vec<String> {
    raw.get("ErrorEquals")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn build_retry_rule(raw: &Value) -> RetryRule {
    let defaults = RetryRule::default();
    RetryRule {
        error_equals: error_equals(raw),
        interval_seconds: raw
            .get("IntervalSeconds")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.interval_seconds),
        max_attempts: raw
            .get("MaxAttempts")
            .and_then(Value::as_u64)
            .map_or(defaults.max_attempts, |n| n as u32),
        backoff_rate: raw
            .get("BackoffRate")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.backoff_rate),
        max_delay_seconds: raw.get("MaxDelaySeconds").and_then(Value::as_f64),
        jitter_strategy: raw
            .get("JitterStrategy")
            .and_then(Value::as_str)
            .filter(|s| *s == "FULL")
            .map(|_| JitterStrategy::Full),
    }
}

fn build_catch_rule(raw: &Value) -> Option<CatchRule> {
    let next = raw.get("Next").and_then(Value::as_str)?.to_string();
    let result_path = match raw.get("ResultPath") {
        None => None,
        Some(Value::Null) => Some(PathValue::Null),
        Some(Value::String(s)) => Some(PathValue::Path(s.clone())),
        Some(_) => None,
    };
    Some(CatchRule {
        error_equals: error_equals(raw),
        next,
        result_path,
        output: raw.get("Output").cloned(),
        assign: raw.get("Assign").cloned(),
    })
}

fn build_wait_duration(obj: &Map<String, Value>) -> WaitDuration {
    if let Some(path) = string_field(obj, "SecondsPath") {
        return WaitDuration::SecondsPath(path);
    }
    if let Some(path) = string_field(obj, "TimestampPath") {
        return WaitDuration::TimestampPath(path);
    }
    if let Some(ts) = obj.get("Timestamp") {
        return WaitDuration::Timestamp(ts.clone());
    }
    WaitDuration::Seconds(obj.get("Seconds").cloned().unwrap_or(Value::Null))
}

fn build_choice_rule(raw: &Value, lang: QueryLanguage) -> Option<ChoiceRule> {
    let obj = raw.as_object()?;
    let next = obj.get("Next").and_then(Value::as_str)?.to_string();
    let test = build_choice_test(raw, lang)?;
    Some(ChoiceRule {
        test,
        next,
        assign: obj.get("Assign").cloned(),
    })
}

fn build_choice_test(raw: &Value, lang: QueryLanguage) -> Option<ChoiceTest> {
    let obj = raw.as_object()?;
    if lang.is_jsonata() {
        return match obj.get("Condition") {
            Some(Value::String(cond)) => Some(ChoiceTest::Condition(cond.clone())),
            Some(Value::Bool(b)) => Some(ChoiceTest::Condition(format!("{{% {b} %}}"))),
            _ => None,
        };
    }
    if let Some(Value::Array(rules)) = obj.get("And") {
        return Some(ChoiceTest::And(
            rules
                .iter()
                .filter_map(|rule| build_choice_test(rule, lang))
                .collect(),
        ));
    }
    if let Some(Value::Array(rules)) = obj.get("Or") {
        return Some(ChoiceTest::Or(
            rules
                .iter()
                .filter_map(|rule| build_choice_test(rule, lang))
                .collect(),
        ));
    }
    if let Some(inner) = obj.get("Not") {
        return Some(ChoiceTest::Not(Box::new(build_choice_test(inner, lang)?)));
    }
    let variable = obj.get("Variable").and_then(Value::as_str)?.to_string();
    let (op, value) = obj
        .iter()
        .find_map(|(key, value)| parse_operator(key).map(|op| (op, value)))?;
    match op {
        ParsedOperator::Unary(test) => Some(ChoiceTest::Unary {
            variable,
            test,
            expected: value.as_bool().unwrap_or(true),
        }),
        ParsedOperator::Compare {
            subject,
            relation,
            by_path,
        } => Some(ChoiceTest::Compare {
            variable,
            subject,
            relation,
            by_path,
            value: value.clone(),
        }),
    }
}
