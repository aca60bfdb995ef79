//! # stepbench: a deterministic local test bench for States Language workflows
//!
//! stepbench loads an Amazon States Language definition, executes it
//! end-to-end against user-supplied inputs, consults a mock layer for
//! every external side-effecting task, and reports per-state
//! inputs/outputs, variables, execution path, and coverage. It exists to
//! unit-test workflow definitions without deploying them.
//!
//! ## Core Concepts
//!
//! - **States**: a typed sum over `Task`, `Pass`, `Choice`, `Wait`,
//!   `Succeed`, `Fail`, `Map` (inline and distributed), and `Parallel`,
//!   produced by a validating factory
//! - **Expressions**: JSONPath with the `States.*` intrinsics, or JSONata
//!   with the Step Functions extensions; one field set per mode
//! - **Mocks**: deterministic stand-ins (`fixed`, `conditional`,
//!   `stateful`, `error`, `itemReader`, `resultWriter`) selected by state
//!   name
//! - **Engine**: a cooperative, virtual-time transition loop with
//!   `Retry`/`Catch`, recorded executions, and isolation of variable
//!   scopes across Map/Parallel fan-outs
//! - **Runner**: declarative test cases diffed into assertion lists, with
//!   nested coverage accounting
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use std::sync::Arc;
//! use stepbench::asl;
//! use stepbench::engine::{Engine, EngineOptions};
//! use stepbench::mocks::{MockConfig, MockEngine, StateMock};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let machine = Arc::new(
//!     asl::compile(&json!({
//!         "StartAt": "Greet",
//!         "States": {
//!             "Greet": { "Type": "Task", "Resource": "arn:aws:lambda:greet", "End": true }
//!         }
//!     }))
//!     .expect("valid definition"),
//! );
//! let mocks = MockEngine::new(&MockConfig::new(vec![
//!     StateMock::fixed("Greet", json!({"message": "hello"})),
//! ]));
//! let engine = Engine::new(machine, mocks, EngineOptions::default());
//!
//! let outcome = engine.execute(json!({"name": "world"})).await;
//! assert!(outcome.success);
//! assert_eq!(outcome.output, json!({"message": "hello"}));
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`asl`] - state model, validating factory, structural analysis
//! - [`expr`] - JSONPath/intrinsics and JSONata evaluation
//! - [`mocks`] - mock configuration and resolution
//! - [`engine`] - the execution engine and its outcome types
//! - [`coverage`] - nested coverage counters and reports
//! - [`runner`] - declarative test cases and suite execution
//! - [`errors`] - workflow error values and validation errors

pub mod asl;
pub mod coverage;
pub mod engine;
pub mod errors;
pub mod expr;
pub mod mocks;
pub mod runner;
pub mod telemetry;
pub mod types;
pub mod utils;

mod dataflow;
mod exec;

pub use exec::context::{MapRun, ParallelRun, StateExecution, VirtualClock};
