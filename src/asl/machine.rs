//! The compiled, immutable state machine and its sub-machines.

use crate::types::QueryLanguage;

use super::state::State;

/// An ordered, name-addressed collection of states.
///
/// Definition order is preserved so that coverage reports and uncovered
/// listings are stable. Lookup is linear; state machines are small.
#[derive(Clone, Debug, Default)]
pub struct StateSet {
    entries: Vec<(String, State)>,
}

impl StateSet {
    #[must_use]
    pub fn new(entries: Vec<(String, State)>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&State> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &State)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A sub-machine: a Map `ItemProcessor` or one Parallel branch.
#[derive(Clone, Debug)]
pub struct Branch {
    pub start_at: String,
    pub states: StateSet,
}

/// A compiled workflow definition. Immutable once built; shared read-only
/// by every test run.
#[derive(Clone, Debug)]
pub struct StateMachine {
    pub start_at: String,
    pub states: StateSet,
    pub query_language: QueryLanguage,
    pub timeout_seconds: Option<f64>,
    pub comment: Option<String>,
}

impl StateMachine {
    /// The top-level flow viewed as a branch, for the shared execution
    /// loop.
    #[must_use]
    pub fn as_branch(&self) -> Branch {
        Branch {
            start_at: self.start_at.clone(),
            states: self.states.clone(),
        }
    }
}
