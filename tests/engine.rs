use pretty_assertions::assert_eq;
use serde_json::json;

use stepbench::mocks::StateMock;

mod common;
use common::{engine_with, engine_with_options, pinned_options};

#[tokio::test]
async fn retry_then_catch_routes_to_the_handler() {
    let engine = engine_with(
        json!({
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:flaky",
                    "Retry": [{
                        "ErrorEquals": ["E"],
                        "MaxAttempts": 2,
                        "IntervalSeconds": 0
                    }],
                    "Catch": [{
                        "ErrorEquals": ["E"],
                        "ResultPath": "$.failure",
                        "Next": "H"
                    }],
                    "End": true
                },
                "H": { "Type": "Pass", "End": true }
            }
        }),
        vec![StateMock::error("T", "E", "still failing")],
    );
    let outcome = engine.execute(json!({ "original": true })).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.execution_path, vec!["T", "H"]);
    // Initial call plus two retries.
    assert_eq!(engine.mocks().call_count("T"), 3);
    // The error payload merged into the raw input via ResultPath.
    assert_eq!(
        outcome.output,
        json!({
            "original": true,
            "failure": { "Error": "E", "Cause": "still failing" }
        })
    );
}

#[tokio::test]
async fn retry_only_matches_declared_error_types() {
    let engine = engine_with(
        json!({
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:flaky",
                    "Retry": [{ "ErrorEquals": ["Other"], "MaxAttempts": 5 }],
                    "End": true
                }
            }
        }),
        vec![StateMock::error("T", "E", "boom")],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    // No retries happened for the unmatched type.
    assert_eq!(engine.mocks().call_count("T"), 1);
    assert_eq!(outcome.error_message().as_deref(), Some("E: boom"));
}

#[tokio::test]
async fn states_all_matches_everything() {
    let engine = engine_with(
        json!({
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:flaky",
                    "Catch": [{ "ErrorEquals": ["States.ALL"], "Next": "H" }],
                    "End": true
                },
                "H": { "Type": "Pass", "Result": "caught", "End": true }
            }
        }),
        vec![StateMock::error("T", "Whatever.Type", "boom")],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(outcome.success);
    assert_eq!(outcome.output, json!("caught"));
}

#[tokio::test]
async fn stateful_mock_drives_retry_to_success() {
    use stepbench::mocks::MockReply;
    let engine = engine_with(
        json!({
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:flaky",
                    "Retry": [{
                        "ErrorEquals": ["States.TaskFailed"],
                        "MaxAttempts": 3,
                        "IntervalSeconds": 1,
                        "BackoffRate": 2.0
                    }],
                    "End": true
                }
            }
        }),
        vec![StateMock::stateful(
            "T",
            vec![
                MockReply::error("Transient", "try again"),
                MockReply::error("Transient", "try again"),
                MockReply::response(json!("recovered")),
            ],
        )],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.output, json!("recovered"));
    assert_eq!(engine.mocks().call_count("T"), 3);
}

#[tokio::test]
async fn wait_beyond_the_machine_budget_times_out() {
    // 650 seconds of virtual wait against a 600 second budget.
    let engine = engine_with(
        json!({
            "TimeoutSeconds": 600,
            "StartAt": "W",
            "States": {
                "W": { "Type": "Wait", "Seconds": 650, "End": true }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.expect("error").error, "States.Timeout");
}

#[tokio::test]
async fn wait_within_budget_does_not_sleep() {
    let started = std::time::Instant::now();
    let engine = engine_with(
        json!({
            "TimeoutSeconds": 600,
            "StartAt": "W",
            "States": {
                "W": { "Type": "Wait", "Seconds": 500, "Next": "Done" },
                "Done": { "Type": "Succeed" }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({ "x": 1 })).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.output, json!({ "x": 1 }));
    // Virtual time only; the wall clock barely moved.
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn wait_seconds_path_reads_the_input() {
    let engine = engine_with(
        json!({
            "TimeoutSeconds": 10,
            "StartAt": "W",
            "States": {
                "W": { "Type": "Wait", "SecondsPath": "$.delay", "End": true }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({ "delay": 60 })).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.expect("error").error, "States.Timeout");
}

#[tokio::test]
async fn wait_timestamp_is_measured_from_the_pinned_start() {
    let engine = engine_with_options(
        json!({
            "TimeoutSeconds": 3600,
            "StartAt": "W",
            "States": {
                // One hour and one second past the pinned start time.
                "W": { "Type": "Wait", "Timestamp": "2024-06-01T13:00:01Z", "End": true }
            }
        }),
        vec![],
        pinned_options(),
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.expect("error").error, "States.Timeout");
}

#[tokio::test]
async fn fail_state_formats_error_and_cause() {
    let engine = engine_with(
        json!({
            "StartAt": "F",
            "States": {
                "F": { "Type": "Fail", "Error": "Custom.Error", "Cause": "went wrong" }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error_message().as_deref(),
        Some("Custom.Error: went wrong")
    );
}

#[tokio::test]
async fn fail_state_defaults() {
    let engine = engine_with(
        json!({
            "StartAt": "F",
            "States": { "F": { "Type": "Fail" } }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert_eq!(
        outcome.error_message().as_deref(),
        Some("States.Failed: State failed")
    );
}

#[tokio::test]
async fn fail_state_paths_read_the_input() {
    let engine = engine_with(
        json!({
            "StartAt": "F",
            "States": {
                "F": { "Type": "Fail", "ErrorPath": "$.e", "CausePath": "$.c" }
            }
        }),
        vec![],
    );
    let outcome = engine
        .execute(json!({ "e": "Dyn.Error", "c": "dynamic cause" }))
        .await;
    assert_eq!(
        outcome.error_message().as_deref(),
        Some("Dyn.Error: dynamic cause")
    );
}

#[tokio::test]
async fn succeed_applies_output_path() {
    let engine = engine_with(
        json!({
            "StartAt": "S",
            "States": {
                "S": { "Type": "Succeed", "OutputPath": "$.keep" }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({ "keep": { "a": 1 }, "drop": 2 })).await;
    assert!(outcome.success);
    assert_eq!(outcome.output, json!({ "a": 1 }));
}

#[tokio::test]
async fn execution_path_follows_transitions() {
    let engine = engine_with(
        json!({
            "StartAt": "A",
            "States": {
                "A": { "Type": "Pass", "Next": "B" },
                "B": { "Type": "Pass", "Next": "C" },
                "C": { "Type": "Succeed" }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert_eq!(outcome.execution_path, vec!["A", "B", "C"]);
    assert_eq!(outcome.state_executions.len(), 3);
}

#[tokio::test]
async fn runaway_loops_hit_the_transition_cap() {
    let mut options = stepbench::engine::EngineOptions::default();
    options.max_transitions = 50;
    let engine = engine_with_options(
        json!({
            "StartAt": "A",
            "States": {
                "A": { "Type": "Pass", "Next": "B" },
                "B": { "Type": "Pass", "Next": "A" }
            }
        }),
        vec![],
        options,
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    let error = outcome.error.expect("error");
    assert_eq!(error.error, "States.Runtime");
    assert!(error.cause.contains("transitions"));
}

#[tokio::test]
async fn task_delay_beyond_its_timeout_raises_states_timeout() {
    use stepbench::mocks::{MockKind, MockReply};
    let engine = engine_with(
        json!({
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:slow",
                    "TimeoutSeconds": 5,
                    "End": true
                }
            }
        }),
        vec![StateMock {
            state: "T".to_string(),
            kind: MockKind::Fixed(MockReply::response(json!("late")).with_delay(10.0)),
        }],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.expect("error").error, "States.Timeout");
}

#[tokio::test]
async fn variables_flow_between_states_in_one_chain() {
    let engine = engine_with(
        json!({
            "StartAt": "A",
            "States": {
                "A": { "Type": "Pass", "Assign": { "step": "a" }, "Next": "B" },
                "B": {
                    "Type": "Pass",
                    "Parameters": { "from.$": "$step" },
                    "End": true
                }
            }
        }),
        vec![],
    );
    let outcome = engine.execute(json!({})).await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.output, json!({ "from": "a" }));
}
