//! Choice executor. Rules are evaluated in order against the raw input;
//! the first match wins, `Default` backstops, and no match at all is a
//! `ChoiceNoMatch` fault. Choice never suspends and never consults the
//! mock engine.

use chrono::DateTime;
use serde_json::{Value, json};
use tracing::debug;

use crate::asl::state::ChoiceState;
use crate::asl::{ChoiceTest, CompareRelation, CompareSubject, UnaryTest, choice::wildcard_match};
use crate::dataflow::{jsonata_assignments, jsonpath_assignments};
use crate::errors::StatesError;
use crate::expr::jsonata::{self, JsonataScope};
use crate::expr::jsonpath::{self, EvalScope};
use crate::utils::json_ext::values_equal;

use super::context::ExecutionContext;
use super::{RunError, StepOutcome};

pub(crate) fn execute(
    name: &str,
    choice: &ChoiceState,
    ctx: &mut ExecutionContext,
) -> Result<StepOutcome, RunError> {
    let input = ctx.input.clone();
    let scope = EvalScope::new(&input, &ctx.context_object, &ctx.variables);

    let mut target: Option<(String, Option<Value>)> = None;
    for rule in &choice.choices {
        if evaluate_test(&rule.test, &scope, ctx)? {
            target = Some((rule.next.clone(), rule.assign.clone()));
            break;
        }
    }
    let (next, assign) = match target {
        Some(t) => t,
        None => match &choice.default {
            Some(default) => (default.clone(), None),
            None => return Err(RunError::Fault(StatesError::no_choice_match(name))),
        },
    };
    debug!(state = name, next = %next, "choice matched");

    if let Some(assign) = assign {
        let assignments = if choice.common.query_language.is_jsonata() {
            let states = json!({ "input": input, "context": ctx.context_object });
            jsonata_assignments(&assign, &JsonataScope::new(states, &ctx.variables))
                .map_err(RunError::Fault)?
        } else {
            jsonpath_assignments(&assign, &scope).map_err(RunError::Fault)?
        };
        ctx.commit_assignments(assignments);
    }

    ctx.choice_decisions.push((name.to_string(), next.clone()));
    Ok(StepOutcome::Next {
        output: input,
        next,
    })
}

fn evaluate_test(
    test: &ChoiceTest,
    scope: &EvalScope<'_>,
    ctx: &ExecutionContext,
) -> Result<bool, StatesError> {
    match test {
        ChoiceTest::Condition(condition) => {
            let states = json!({ "input": scope.data, "context": ctx.context_object });
            let jscope = JsonataScope::new(states, &ctx.variables);
            let value = jsonata::evaluate_string(condition, &jscope)?;
            Ok(jsonata::truthy(value.as_ref()))
        }
        ChoiceTest::And(tests) => {
            for t in tests {
                if !evaluate_test(t, scope, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ChoiceTest::Or(tests) => {
            for t in tests {
                if evaluate_test(t, scope, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ChoiceTest::Not(inner) => Ok(!evaluate_test(inner, scope, ctx)?),
        ChoiceTest::Unary {
            variable,
            test,
            expected,
        } => {
            let result = evaluate_unary(variable, *test, scope)?;
            Ok(result == *expected)
        }
        ChoiceTest::Compare {
            variable,
            subject,
            relation,
            by_path,
            value,
        } => {
            let actual = resolve_required(variable, scope)?;
            let expected = if *by_path {
                let path = value.as_str().ok_or_else(|| {
                    StatesError::runtime("comparison path operand must be a string")
                })?;
                resolve_required(path, scope)?
            } else {
                value.clone()
            };
            compare(&actual, &expected, *subject, *relation)
        }
    }
}

/// Resolve a condition path, raising the contractual invalid-path error
/// when it references nothing.
fn resolve_required(path: &str, scope: &EvalScope<'_>) -> Result<Value, StatesError> {
    if !jsonpath::exists(path, scope) {
        return Err(StatesError::invalid_choice_path(path));
    }
    jsonpath::evaluate(path, scope)
}

fn evaluate_unary(
    variable: &str,
    test: UnaryTest,
    scope: &EvalScope<'_>,
) -> Result<bool, StatesError> {
    if test == UnaryTest::IsPresent {
        return Ok(jsonpath::exists(variable, scope));
    }
    let actual = resolve_required(variable, scope)?;
    Ok(match test {
        UnaryTest::IsPresent => unreachable!("handled above"),
        UnaryTest::IsNull => actual.is_null(),
        UnaryTest::IsNumeric => actual.is_number(),
        UnaryTest::IsString => actual.is_string(),
        UnaryTest::IsBoolean => actual.is_boolean(),
        UnaryTest::IsTimestamp => actual
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
    })
}

fn compare(
    actual: &Value,
    expected: &Value,
    subject: CompareSubject,
    relation: CompareRelation,
) -> Result<bool, StatesError> {
    match subject {
        CompareSubject::String => {
            let (Some(a), Some(e)) = (actual.as_str(), expected.as_str()) else {
                return Ok(false);
            };
            Ok(match relation {
                CompareRelation::Equals => a == e,
                CompareRelation::LessThan => a < e,
                CompareRelation::LessThanEquals => a <= e,
                CompareRelation::GreaterThan => a > e,
                CompareRelation::GreaterThanEquals => a >= e,
                CompareRelation::Matches => wildcard_match(e, a),
            })
        }
        CompareSubject::Numeric => {
            let (Some(a), Some(e)) = (actual.as_f64(), expected.as_f64()) else {
                return Ok(false);
            };
            Ok(match relation {
                CompareRelation::Equals => a == e,
                CompareRelation::LessThan => a < e,
                CompareRelation::LessThanEquals => a <= e,
                CompareRelation::GreaterThan => a > e,
                CompareRelation::GreaterThanEquals => a >= e,
                CompareRelation::Matches => false,
            })
        }
        CompareSubject::Boolean => Ok(relation == CompareRelation::Equals
            && values_equal(actual, expected)
            && actual.is_boolean()),
        CompareSubject::Timestamp => {
            let parse = |v: &Value| {
                v.as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            };
            let (Some(a), Some(e)) = (parse(actual), parse(expected)) else {
                return Ok(false);
            };
            Ok(match relation {
                CompareRelation::Equals => a == e,
                CompareRelation::LessThan => a < e,
                CompareRelation::LessThanEquals => a <= e,
                CompareRelation::GreaterThan => a > e,
                CompareRelation::GreaterThanEquals => a >= e,
                CompareRelation::Matches => false,
            })
        }
    }
}
