#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;

use stepbench::asl::{self, StateMachine};
use stepbench::engine::{Engine, EngineOptions};
use stepbench::mocks::{MockConfig, MockEngine, StateMock};

pub fn compile(definition: Value) -> Arc<StateMachine> {
    Arc::new(asl::compile(&definition).expect("definition should compile"))
}

pub fn compile_err(definition: Value) -> String {
    asl::compile(&definition)
        .expect_err("definition should be rejected")
        .to_string()
}

pub fn engine_with(definition: Value, mocks: Vec<StateMock>) -> Engine {
    engine_with_options(definition, mocks, EngineOptions::default())
}

pub fn engine_with_options(
    definition: Value,
    mocks: Vec<StateMock>,
    options: EngineOptions,
) -> Engine {
    Engine::new(
        compile(definition),
        MockEngine::new(&MockConfig::new(mocks)),
        options,
    )
}

/// A fixed start time so Choice/Wait behavior is reproducible.
pub fn pinned_options() -> EngineOptions {
    EngineOptions {
        start_time: Some(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&chrono::Utc),
        ),
        execution_name: Some("test-execution".to_string()),
        ..EngineOptions::default()
    }
}
