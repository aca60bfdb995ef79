use serde_json::json;

use stepbench::asl::analysis;

mod common;
use common::compile;

#[test]
fn wait_loop_against_execution_start_time_is_flagged() {
    let machine = compile(json!({
        "StartAt": "Check",
        "States": {
            "Check": {
                "Type": "Choice",
                "Choices": [{
                    "Variable": "$.at",
                    "TimestampEqualsPath": "$$.Execution.StartTime",
                    "Next": "Done"
                }],
                "Default": "Hold"
            },
            "Hold": { "Type": "Wait", "Seconds": 30, "Next": "Check" },
            "Done": { "Type": "Succeed" }
        }
    }));
    let report = analysis::analyze(&machine);
    assert!(report.has_problematic_patterns);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].state, "Check");
}

#[test]
fn loop_without_wait_is_not_flagged() {
    let machine = compile(json!({
        "StartAt": "Check",
        "States": {
            "Check": {
                "Type": "Choice",
                "Choices": [{
                    "Variable": "$.at",
                    "TimestampEqualsPath": "$$.Execution.StartTime",
                    "Next": "Done"
                }],
                "Default": "Spin"
            },
            "Spin": { "Type": "Pass", "Next": "Check" },
            "Done": { "Type": "Succeed" }
        }
    }));
    assert!(!analysis::analyze(&machine).has_problematic_patterns);
}

#[test]
fn wait_loop_without_start_time_comparison_is_not_flagged() {
    let machine = compile(json!({
        "StartAt": "Check",
        "States": {
            "Check": {
                "Type": "Choice",
                "Choices": [{
                    "Variable": "$.count",
                    "NumericLessThan": 10,
                    "Next": "Hold"
                }],
                "Default": "Done"
            },
            "Hold": { "Type": "Wait", "Seconds": 30, "Next": "Check" },
            "Done": { "Type": "Succeed" }
        }
    }));
    assert!(!analysis::analyze(&machine).has_problematic_patterns);
}

#[test]
fn nested_map_processors_are_scanned() {
    let machine = compile(json!({
        "StartAt": "M",
        "States": {
            "M": {
                "Type": "Map",
                "ItemProcessor": {
                    "StartAt": "Check",
                    "States": {
                        "Check": {
                            "Type": "Choice",
                            "Choices": [{
                                "Variable": "$.at",
                                "TimestampGreaterThanPath": "$$.Execution.StartTime",
                                "Next": "Done"
                            }],
                            "Default": "Hold"
                        },
                        "Hold": { "Type": "Wait", "Seconds": 1, "Next": "Check" },
                        "Done": { "Type": "Succeed" }
                    }
                },
                "End": true
            }
        }
    }));
    let report = analysis::analyze(&machine);
    assert!(report.has_problematic_patterns);
    assert_eq!(report.findings[0].state, "M/Check");
}
