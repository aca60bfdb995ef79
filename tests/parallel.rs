use pretty_assertions::assert_eq;
use serde_json::json;

use stepbench::mocks::StateMock;

mod common;
use common::engine_with;

#[tokio::test]
async fn branches_fan_in_as_an_array_in_branch_order() {
    let engine = engine_with(
        json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {
                            "StartAt": "A",
                            "States": {
                                "A": { "Type": "Pass", "Result": "first", "End": true }
                            }
                        },
                        {
                            "StartAt": "B",
                            "States": {
                                "B": { "Type": "Pass", "Result": "second", "End": true }
                            }
                        }
                    ],
                    "End": true
                }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({ "shared": 1 })).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.output, json!(["first", "second"]));
    assert_eq!(outcome.parallel_runs.len(), 1);
    assert_eq!(outcome.parallel_runs[0].branch_count, 2);

    // The parallel state's own record is the summary.
    let summary = outcome
        .state_executions
        .iter()
        .find(|r| r.state == "P")
        .expect("summary record");
    assert!(summary.is_parallel_summary);
}

#[tokio::test]
async fn jsonata_arguments_feed_every_branch() {
    let branch = |factor: u64| {
        let name = format!("B{factor}");
        let mut states = serde_json::Map::new();
        states.insert(
            name.clone(),
            json!({
                "Type": "Pass",
                "Output": format!("{{% {{ \"result\": $states.input.shared * {factor} }} %}}"),
                "End": true
            }),
        );
        json!({ "StartAt": name, "States": states })
    };
    let engine = engine_with(
        json!({
            "QueryLanguage": "JSONata",
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Arguments": "{% { \"shared\": $states.input.value + 100 } %}",
                    "Branches": [branch(1), branch(2), branch(3)],
                    "End": true
                }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({ "value": 50 })).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(
        outcome.output,
        json!([{ "result": 150 }, { "result": 300 }, { "result": 450 }])
    );
}

#[tokio::test]
async fn branch_failure_cancels_siblings_at_their_next_suspension() {
    let engine = engine_with(
        json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {
                            "StartAt": "Quick",
                            "States": {
                                "Quick": { "Type": "Pass", "Result": "done", "End": true }
                            }
                        },
                        {
                            "StartAt": "Boom",
                            "States": {
                                "Boom": {
                                    "Type": "Task",
                                    "Resource": "arn:aws:lambda:boom",
                                    "End": true
                                }
                            }
                        },
                        {
                            "StartAt": "Slow",
                            "States": {
                                "Slow": { "Type": "Wait", "Seconds": 5, "Next": "Late" },
                                "Late": {
                                    "Type": "Task",
                                    "Resource": "arn:aws:lambda:late",
                                    "End": true
                                }
                            }
                        }
                    ],
                    "End": true
                }
            }
        }),
        vec![
            StateMock::error("Boom", "Branch.Failed", "branch exploded"),
            StateMock::fixed("Late", json!("never")),
        ],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.expect("error").error, "Branch.Failed");

    // The finished sibling's record survives.
    assert!(outcome.state_executions.iter().any(|r| r.state == "Quick"));
    // The cancelled branch never reached its task.
    assert_eq!(engine.mocks().call_count("Late"), 0);
}

#[tokio::test]
async fn branch_errors_are_catchable_at_the_parallel_state() {
    let engine = engine_with(
        json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {
                            "StartAt": "Boom",
                            "States": {
                                "Boom": {
                                    "Type": "Task",
                                    "Resource": "arn:aws:lambda:boom",
                                    "End": true
                                }
                            }
                        }
                    ],
                    "Catch": [{ "ErrorEquals": ["States.ALL"], "Next": "H" }],
                    "End": true
                },
                "H": { "Type": "Pass", "End": true }
            }
        }),
        vec![StateMock::error("Boom", "Branch.Failed", "nope")],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.execution_path, vec!["P", "H"]);
    assert_eq!(
        outcome.output,
        json!({ "Error": "Branch.Failed", "Cause": "nope" })
    );
}

#[tokio::test]
async fn branch_variables_never_leak_to_the_outer_scope() {
    let engine = engine_with(
        json!({
            "StartAt": "Seed",
            "States": {
                "Seed": { "Type": "Pass", "Assign": { "outer": 1 }, "Next": "P" },
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {
                            "StartAt": "B",
                            "States": {
                                "B": {
                                    "Type": "Pass",
                                    "Parameters": { "sees.$": "$outer" },
                                    "Assign": { "inner": true },
                                    "End": true
                                }
                            }
                        }
                    ],
                    "End": true
                }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    // Branches copy the outer variables in.
    assert_eq!(outcome.output, json!([{ "sees": 1 }]));
    // Their own assignments stay inside.
    assert_eq!(outcome.variables.get("inner"), None);
}
