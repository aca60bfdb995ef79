use pretty_assertions::assert_eq;
use serde_json::json;

use stepbench::asl;
use stepbench::types::QueryLanguage;

mod common;
use common::{compile, compile_err};

fn jsonata_machine(state: serde_json::Value) -> serde_json::Value {
    json!({
        "QueryLanguage": "JSONata",
        "StartAt": "S",
        "States": { "S": state }
    })
}

fn jsonpath_machine(state: serde_json::Value) -> serde_json::Value {
    json!({
        "StartAt": "S",
        "States": { "S": state }
    })
}

#[test]
fn parameters_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:lambda:fn",
        "Parameters": { "a": 1 },
        "End": true
    })));
    assert_eq!(
        err,
        "Parameters field is not supported in JSONata mode. Use Arguments field instead"
    );
}

#[test]
fn output_path_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:lambda:fn",
        "OutputPath": "$.a",
        "End": true
    })));
    assert_eq!(
        err,
        "OutputPath field is not supported in JSONata mode. Use Output field instead"
    );
}

#[test]
fn input_path_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:lambda:fn",
        "InputPath": "$.a",
        "End": true
    })));
    assert_eq!(
        err,
        "InputPath field is not supported in JSONata mode. Use Assign field instead"
    );
}

#[test]
fn result_path_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:lambda:fn",
        "ResultPath": "$.a",
        "End": true
    })));
    assert_eq!(
        err,
        "ResultPath field is not supported in JSONata mode. Use Output field instead"
    );
}

#[test]
fn wait_path_fields_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Wait",
        "SecondsPath": "$.delay",
        "End": true
    })));
    assert_eq!(
        err,
        "SecondsPath field is not supported in JSONata mode. Use Seconds field instead"
    );

    let err = compile_err(jsonata_machine(json!({
        "Type": "Wait",
        "TimestampPath": "$.when",
        "End": true
    })));
    assert_eq!(
        err,
        "TimestampPath field is not supported in JSONata mode. Use Timestamp field instead"
    );
}

#[test]
fn items_path_rejected_in_jsonata_mode() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Map",
        "ItemsPath": "$.items",
        "ItemProcessor": {
            "StartAt": "Inner",
            "States": { "Inner": { "Type": "Pass", "End": true } }
        },
        "End": true
    })));
    assert_eq!(
        err,
        "ItemsPath field is not supported in JSONata mode. Use Items field instead"
    );
}

#[test]
fn jsonpath_choice_rule_fields_rejected_in_jsonata_mode() {
    let err = compile_err(json!({
        "QueryLanguage": "JSONata",
        "StartAt": "C",
        "States": {
            "C": {
                "Type": "Choice",
                "Choices": [
                    { "Variable": "$.x", "NumericEquals": 1, "Next": "Done" }
                ],
                "Default": "Done"
            },
            "Done": { "Type": "Succeed" }
        }
    }));
    assert_eq!(
        err,
        "JSONPath choice rule fields (Variable, And, Or, Not) are not supported in JSONata mode. Use 'Condition' field instead"
    );
}

#[test]
fn unwrapped_jsonata_condition_rejected() {
    let err = compile_err(json!({
        "QueryLanguage": "JSONata",
        "StartAt": "C",
        "States": {
            "C": {
                "Type": "Choice",
                "Choices": [
                    { "Condition": "$states.input.x = 1", "Next": "Done" }
                ],
                "Default": "Done"
            },
            "Done": { "Type": "Succeed" }
        }
    }));
    assert_eq!(err, "Choice Condition must be a JSONata expression wrapped in {% %}");
}

#[test]
fn integrated_service_arn_requires_arguments() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:states:::dynamodb:putItem",
        "End": true
    })));
    assert_eq!(
        err,
        "Arguments field is required for resource ARN: arn:aws:states:::dynamodb:putItem"
    );
}

#[test]
fn terminal_state_cannot_have_next() {
    let err = compile_err(json!({
        "StartAt": "Done",
        "States": {
            "Done": { "Type": "Succeed", "Next": "Other" },
            "Other": { "Type": "Succeed" }
        }
    }));
    assert_eq!(err, "Terminal state Done cannot have a Next field");
}

#[test]
fn pass_does_not_support_arguments() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Pass",
        "Arguments": { "a": 1 },
        "End": true
    })));
    assert_eq!(err, "Pass state does not support Arguments field");

    let err = compile_err(jsonpath_machine(json!({
        "Type": "Pass",
        "Arguments": { "a": 1 },
        "End": true
    })));
    assert_eq!(err, "Pass state does not support Arguments field");
}

#[test]
fn map_requires_processor_and_start_at() {
    let err = compile_err(jsonpath_machine(json!({
        "Type": "Map",
        "End": true
    })));
    assert_eq!(err, "Map state requires ItemProcessor or Iterator field");

    let err = compile_err(jsonpath_machine(json!({
        "Type": "Map",
        "ItemProcessor": {
            "States": { "Inner": { "Type": "Pass", "End": true } }
        },
        "End": true
    })));
    assert_eq!(err, "ItemProcessor/Iterator requires StartAt field");
}

#[test]
fn legacy_iterator_is_accepted() {
    let machine = compile(jsonpath_machine(json!({
        "Type": "Map",
        "Iterator": {
            "StartAt": "Inner",
            "States": { "Inner": { "Type": "Pass", "End": true } }
        },
        "End": true
    })));
    let state = machine.states.get("S").expect("state");
    match state {
        stepbench::asl::State::Map(map) => {
            assert_eq!(map.item_processor.start_at, "Inner");
        }
        other => panic!("expected a Map state, got {:?}", other.kind()),
    }
}

#[test]
fn parallel_requires_branches() {
    let err = compile_err(jsonpath_machine(json!({
        "Type": "Parallel",
        "Branches": [],
        "End": true
    })));
    assert_eq!(err, "Parallel state requires non-empty Branches array");
}

#[test]
fn fail_cause_and_error_exclusivity() {
    let err = compile_err(jsonpath_machine(json!({
        "Type": "Fail",
        "Cause": "boom",
        "CausePath": "$.cause"
    })));
    assert_eq!(err, "Fail state cannot have both Cause and CausePath fields");

    let err = compile_err(jsonpath_machine(json!({
        "Type": "Fail",
        "Error": "Boom",
        "ErrorPath": "$.error"
    })));
    assert_eq!(err, "Fail state cannot have both Error and ErrorPath fields");
}

#[test]
fn wait_duration_cardinality() {
    let err = compile_err(jsonpath_machine(json!({
        "Type": "Wait",
        "End": true
    })));
    assert_eq!(err, "Wait state must have exactly one wait duration field");

    let err = compile_err(jsonpath_machine(json!({
        "Type": "Wait",
        "Seconds": 5,
        "Timestamp": "2024-01-01T00:00:00Z",
        "End": true
    })));
    assert_eq!(err, "Wait state must have exactly one wait duration field");
}

#[test]
fn multiple_violations_reported_in_one_message() {
    let err = compile_err(jsonata_machine(json!({
        "Type": "Task",
        "Resource": "arn:aws:lambda:fn",
        "Parameters": { "a": 1 },
        "ResultPath": "$.r",
        "End": true
    })));
    assert_eq!(
        err,
        "Parameters field is not supported in JSONata mode. Use Arguments field instead; \
         ResultPath field is not supported in JSONata mode. Use Output field instead"
    );
}

#[test]
fn start_at_must_exist() {
    let err = compile_err(json!({
        "StartAt": "Ghost",
        "States": { "S": { "Type": "Succeed" } }
    }));
    assert_eq!(err, "StartAt state 'Ghost' not found in States");
}

#[test]
fn next_targets_are_validated() {
    let err = compile_err(json!({
        "StartAt": "S",
        "States": { "S": { "Type": "Pass", "Next": "Ghost" } }
    }));
    assert_eq!(err, "State S has Next targeting unknown state 'Ghost'");
}

#[test]
fn query_language_inheritance() {
    // A state-level override wins over the machine default.
    let machine = compile(json!({
        "StartAt": "A",
        "States": {
            "A": {
                "Type": "Task",
                "Resource": "arn:aws:lambda:fn",
                "QueryLanguage": "JSONata",
                "End": true
            }
        }
    }));
    assert_eq!(
        machine.states.get("A").expect("state").query_language(),
        QueryLanguage::Jsonata
    );

    // A Map's override propagates into its processor states.
    let machine = compile(json!({
        "StartAt": "M",
        "States": {
            "M": {
                "Type": "Map",
                "QueryLanguage": "JSONata",
                "Items": "{% $states.input.items %}",
                "ItemProcessor": {
                    "StartAt": "Inner",
                    "States": { "Inner": { "Type": "Pass", "End": true } }
                },
                "End": true
            }
        }
    }));
    let stepbench::asl::State::Map(map) = machine.states.get("M").expect("state") else {
        panic!("expected Map");
    };
    assert_eq!(
        map.item_processor
            .states
            .get("Inner")
            .expect("inner")
            .query_language(),
        QueryLanguage::Jsonata
    );
}

#[test]
fn parallel_override_does_not_propagate_to_branches() {
    // The branch state keeps the machine-level JSONPath mode, so its
    // Parameters field stays legal even though the Parallel itself is
    // JSONata.
    let machine = compile(json!({
        "StartAt": "P",
        "States": {
            "P": {
                "Type": "Parallel",
                "QueryLanguage": "JSONata",
                "Branches": [
                    {
                        "StartAt": "B",
                        "States": {
                            "B": {
                                "Type": "Pass",
                                "Parameters": { "x.$": "$.value" },
                                "End": true
                            }
                        }
                    }
                ],
                "End": true
            }
        }
    }));
    let stepbench::asl::State::Parallel(parallel) = machine.states.get("P").expect("state")
    else {
        panic!("expected Parallel");
    };
    assert_eq!(
        parallel.branches[0]
            .states
            .get("B")
            .expect("branch state")
            .query_language(),
        QueryLanguage::JsonPath
    );
}

#[test]
fn compile_is_pure_on_valid_input() {
    let definition = json!({
        "StartAt": "S",
        "States": { "S": { "Type": "Pass", "End": true } }
    });
    assert!(asl::compile(&definition).is_ok());
    assert!(asl::compile(&definition).is_ok());
}
