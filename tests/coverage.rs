use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use stepbench::coverage::CoverageTracker;
use stepbench::engine::{Engine, EngineOptions};
use stepbench::mocks::{MockConfig, MockEngine};

mod common;
use common::compile;

fn machine_with_choice_and_map() -> serde_json::Value {
    json!({
        "StartAt": "Decide",
        "States": {
            "Decide": {
                "Type": "Choice",
                "Choices": [
                    { "Variable": "$.go", "BooleanEquals": true, "Next": "M" }
                ],
                "Default": "Skip"
            },
            "M": {
                "Type": "Map",
                "ItemsPath": "$.items",
                "ItemProcessor": {
                    "StartAt": "Inner",
                    "States": {
                        "Inner": { "Type": "Pass", "Next": "Unvisited" },
                        "Unvisited": { "Type": "Pass", "End": true }
                    }
                },
                "End": true
            },
            "Skip": { "Type": "Succeed" }
        }
    })
}

async fn run_once(
    tracker: &mut CoverageTracker,
    definition: serde_json::Value,
    input: serde_json::Value,
) {
    let engine = Engine::new(
        compile(definition),
        MockEngine::new(&MockConfig::default()),
        EngineOptions::default(),
    );
    let outcome = engine.execute(input).await;
    tracker.record(&outcome);
}

#[tokio::test]
async fn coverage_counts_top_level_branches_and_nested() {
    let definition = machine_with_choice_and_map();
    let machine = compile(definition.clone());
    let mut tracker = CoverageTracker::new(Arc::clone(&machine));

    run_once(&mut tracker, definition, json!({ "go": true, "items": [1] })).await;
    let report = tracker.report();

    // Decide and M ran; Skip did not.
    assert_eq!(report.top_level.total, 3);
    assert_eq!(report.top_level.covered, 2);
    assert_eq!(report.top_level.uncovered, vec!["Skip"]);

    // One of the two choice targets was taken.
    assert_eq!(report.branches.total, 2);
    assert_eq!(report.branches.covered, 1);

    // Inside the map, Inner and Unvisited both ran.
    let (name, nested) = &report.nested[0];
    assert_eq!(name, "M");
    assert_eq!(nested.total, 2);
    assert_eq!(nested.covered, 2);
    assert_eq!(nested.pct, 100.0);
}

#[tokio::test]
async fn repeated_runs_never_exceed_one_hundred_percent() {
    let definition = machine_with_choice_and_map();
    let machine = compile(definition.clone());
    let mut tracker = CoverageTracker::new(machine);

    for _ in 0..5 {
        run_once(
            &mut tracker,
            definition.clone(),
            json!({ "go": true, "items": [1, 2, 3] }),
        )
        .await;
    }
    run_once(&mut tracker, definition, json!({ "go": false })).await;

    let report = tracker.report();
    assert_eq!(report.top_level.covered, report.top_level.total);
    assert_eq!(report.top_level.pct, 100.0);
    assert!(report.branches.pct <= 100.0);
    for (_, counter) in &report.nested {
        assert!(counter.covered <= counter.total);
        assert!((0.0..=100.0).contains(&counter.pct));
    }
}

#[tokio::test]
async fn empty_universe_counts_as_covered() {
    let definition = json!({
        "StartAt": "Only",
        "States": { "Only": { "Type": "Succeed" } }
    });
    let machine = compile(definition.clone());
    let mut tracker = CoverageTracker::new(machine);
    run_once(&mut tracker, definition, json!({})).await;

    let report = tracker.report();
    assert_eq!(report.branches.total, 0);
    assert_eq!(report.branches.pct, 100.0);
    assert!(report.nested.is_empty());
}
