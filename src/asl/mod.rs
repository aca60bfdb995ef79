//! The typed state-machine model: state variants, choice rules, the
//! validating factory, and structural analysis.

pub mod analysis;
pub mod choice;
pub mod factory;
pub mod machine;
pub mod state;

pub use choice::{ChoiceRule, ChoiceTest, CompareRelation, CompareSubject, UnaryTest};
pub use factory::compile;
pub use machine::{Branch, StateMachine, StateSet};
pub use state::{
    CatchRule, ChoiceState, FailState, ItemBatcherConfig, ItemReaderConfig, JitterStrategy,
    MapMode, MapState, ParallelState, PassState, PathValue, ResultWriterConfig, RetryRule, State,
    SucceedState, TaskState, TransformFields, WaitDuration, WaitState,
};
