use pretty_assertions::assert_eq;
use serde_json::json;

mod common;
use common::engine_with;

fn choice_machine(rules: serde_json::Value, default: Option<&str>) -> serde_json::Value {
    let mut choice = json!({ "Type": "Choice", "Choices": rules });
    if let Some(default) = default {
        choice["Default"] = json!(default);
    }
    json!({
        "StartAt": "Decide",
        "States": {
            "Decide": choice,
            "Low": { "Type": "Pass", "Result": "low", "End": true },
            "High": { "Type": "Pass", "Result": "high", "End": true },
            "Fallback": { "Type": "Pass", "Result": "fallback", "End": true }
        }
    })
}

#[tokio::test]
async fn first_matching_rule_wins() {
    let machine = choice_machine(
        json!([
            { "Variable": "$.n", "NumericLessThan": 10, "Next": "Low" },
            { "Variable": "$.n", "NumericGreaterThanEquals": 10, "Next": "High" }
        ]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine.clone(), vec![]).execute(json!({ "n": 3 })).await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Low"]);
    assert_eq!(
        outcome.choice_decisions,
        vec![("Decide".to_string(), "Low".to_string())]
    );

    let outcome = engine_with(machine, vec![]).execute(json!({ "n": 42 })).await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);
}

#[tokio::test]
async fn default_backstops_unmatched_input() {
    let machine = choice_machine(
        json!([{ "Variable": "$.kind", "StringEquals": "a", "Next": "Low" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine, vec![]).execute(json!({ "kind": "z" })).await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn no_match_without_default_fails() {
    let machine = choice_machine(
        json!([{ "Variable": "$.kind", "StringEquals": "a", "Next": "Low" }]),
        None,
    );
    let outcome = engine_with(machine, vec![]).execute(json!({ "kind": "z" })).await;
    assert!(!outcome.success);
    let error = outcome.error.expect("error");
    assert_eq!(error.error, "ChoiceNoMatch");
}

#[tokio::test]
async fn boolean_combinators_nest() {
    let machine = choice_machine(
        json!([
            {
                "And": [
                    { "Variable": "$.n", "NumericGreaterThan": 0 },
                    {
                        "Or": [
                            { "Variable": "$.kind", "StringEquals": "a" },
                            { "Not": { "Variable": "$.kind", "StringEquals": "b" } }
                        ]
                    }
                ],
                "Next": "High"
            }
        ]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine.clone(), vec![])
        .execute(json!({ "n": 5, "kind": "c" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);

    let outcome = engine_with(machine, vec![])
        .execute(json!({ "n": 5, "kind": "b" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn string_matches_wildcards() {
    let machine = choice_machine(
        json!([{ "Variable": "$.file", "StringMatches": "*.csv", "Next": "High" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine.clone(), vec![])
        .execute(json!({ "file": "data.csv" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);

    let outcome = engine_with(machine, vec![])
        .execute(json!({ "file": "data.json" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn path_comparators_compare_two_locations() {
    let machine = choice_machine(
        json!([{ "Variable": "$.a", "NumericEqualsPath": "$.b", "Next": "High" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine, vec![])
        .execute(json!({ "a": 4, "b": 4 }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);
}

#[tokio::test]
async fn timestamp_comparators_parse_rfc3339() {
    let machine = choice_machine(
        json!([{
            "Variable": "$.at",
            "TimestampGreaterThan": "2024-01-01T00:00:00Z",
            "Next": "High"
        }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine, vec![])
        .execute(json!({ "at": "2024-06-01T00:00:00Z" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);
}

#[tokio::test]
async fn is_present_is_true_exactly_when_the_path_exists() {
    let machine = choice_machine(
        json!([{ "Variable": "$.maybe", "IsPresent": false, "Next": "High" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine.clone(), vec![]).execute(json!({})).await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);

    let outcome = engine_with(machine, vec![])
        .execute(json!({ "maybe": null }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn missing_path_in_comparator_raises_invalid_path() {
    let machine = choice_machine(
        json!([{ "Variable": "$.ghost", "NumericEquals": 1, "Next": "High" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine, vec![]).execute(json!({})).await;
    assert!(!outcome.success);
    let error = outcome.error.expect("error");
    assert_eq!(
        error.cause,
        "Invalid path '$.ghost': The choice state's condition path references an invalid value."
    );
}

#[tokio::test]
async fn type_tests() {
    let machine = choice_machine(
        json!([
            { "Variable": "$.v", "IsNull": true, "Next": "Low" },
            { "Variable": "$.v", "IsNumeric": true, "Next": "High" }
        ]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine.clone(), vec![])
        .execute(json!({ "v": null }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Low"]);

    let outcome = engine_with(machine.clone(), vec![])
        .execute(json!({ "v": 9 }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);

    let outcome = engine_with(machine, vec![])
        .execute(json!({ "v": "str" }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn jsonata_condition_uses_truthiness() {
    let machine = json!({
        "QueryLanguage": "JSONata",
        "StartAt": "Decide",
        "States": {
            "Decide": {
                "Type": "Choice",
                "Choices": [
                    { "Condition": "{% $states.input.value > 10 %}", "Next": "High" }
                ],
                "Default": "Fallback"
            },
            "High": { "Type": "Succeed" },
            "Fallback": { "Type": "Succeed" }
        }
    });
    let outcome = engine_with(machine.clone(), vec![])
        .execute(json!({ "value": 50 }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "High"]);

    let outcome = engine_with(machine, vec![])
        .execute(json!({ "value": 2 }))
        .await;
    assert_eq!(outcome.execution_path, vec!["Decide", "Fallback"]);
}

#[tokio::test]
async fn choice_passes_input_through_unchanged() {
    let machine = choice_machine(
        json!([{ "Variable": "$.n", "NumericEquals": 1, "Next": "Low" }]),
        Some("Fallback"),
    );
    let outcome = engine_with(machine, vec![]).execute(json!({ "n": 1 })).await;
    let record = &outcome.state_executions[0];
    assert_eq!(record.state, "Decide");
    assert_eq!(record.input, record.output);
}
