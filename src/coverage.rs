//! Coverage accounting over one or more executions.
//!
//! Three layers are tracked: top-level states, Choice branches (one per
//! rule target plus `Default`), and nested states inside each Map
//! processor and Parallel state. Percentages are clamped to [0, 100] and
//! an empty universe counts as fully covered.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::asl::{Branch, State, StateMachine};
use crate::engine::ExecutionOutcome;

/// One counter: universe size, covered size, percentage, and the
/// uncovered names in definition order.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageCounter {
    pub total: usize,
    pub covered: usize,
    pub pct: f64,
    pub uncovered: Vec<String>,
}

impl CoverageCounter {
    fn new(universe: Vec<String>, covered: &FxHashSet<String>) -> Self {
        let total = universe.len();
        let uncovered: Vec<String> = universe
            .into_iter()
            .filter(|name| !covered.contains(name))
            .collect();
        let covered_count = total - uncovered.len();
        Self {
            total,
            covered: covered_count,
            pct: percentage(covered_count, total),
            uncovered,
        }
    }
}

fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((covered as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

/// The aggregated report.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub top_level: CoverageCounter,
    pub branches: CoverageCounter,
    /// One counter per Map/Parallel container, keyed by state name.
    pub nested: Vec<(String, CoverageCounter)>,
}

/// Accumulates coverage across executions of one machine.
pub struct CoverageTracker {
    machine: Arc<StateMachine>,
    executed_top: FxHashSet<String>,
    taken_branches: FxHashSet<String>,
    nested_executed: FxHashMap<String, FxHashSet<String>>,
}

impl CoverageTracker {
    #[must_use]
    pub fn new(machine: Arc<StateMachine>) -> Self {
        Self {
            machine,
            executed_top: FxHashSet::default(),
            taken_branches: FxHashSet::default(),
            nested_executed: FxHashMap::default(),
        }
    }

    /// Fold one execution's observations in.
    pub fn record(&mut self, outcome: &ExecutionOutcome) {
        for name in &outcome.execution_path {
            self.executed_top.insert(name.clone());
        }
        for (choice, target) in &outcome.choice_decisions {
            self.taken_branches.insert(branch_key(choice, target));
        }
        for record in &outcome.state_executions {
            if let Some(parent) = &record.parent_state {
                self.nested_executed
                    .entry(parent.clone())
                    .or_default()
                    .insert(record.state.clone());
            }
        }
    }

    #[must_use]
    pub fn report(&self) -> CoverageReport {
        let top_universe: Vec<String> =
            self.machine.states.names().map(str::to_string).collect();

        let mut branch_universe = Vec::new();
        let mut containers: Vec<(String, Vec<String>)> = Vec::new();
        collect_universe(
            &self.machine.as_branch(),
            &mut branch_universe,
            &mut containers,
        );

        let nested = containers
            .into_iter()
            .map(|(container, universe)| {
                let covered = self
                    .nested_executed
                    .get(&container)
                    .cloned()
                    .unwrap_or_default();
                (container.clone(), CoverageCounter::new(universe, &covered))
            })
            .collect();

        CoverageReport {
            top_level: CoverageCounter::new(top_universe, &self.executed_top),
            branches: CoverageCounter::new(branch_universe, &self.taken_branches),
            nested,
        }
    }
}

fn branch_key(choice: &str, target: &str) -> String {
    format!("{choice} -> {target}")
}

/// Walk the machine collecting every Choice branch and every nested
/// container's state universe.
fn collect_universe(
    branch: &Branch,
    branch_universe: &mut Vec<String>,
    containers: &mut Vec<(String, Vec<String>)>,
) {
    for (name, state) in branch.states.iter() {
        match state {
            State::Choice(choice) => {
                for rule in &choice.choices {
                    branch_universe.push(branch_key(name, &rule.next));
                }
                if let Some(default) = &choice.default {
                    branch_universe.push(branch_key(name, default));
                }
            }
            State::Map(map) => {
                containers.push((
                    name.to_string(),
                    map.item_processor
                        .states
                        .names()
                        .map(str::to_string)
                        .collect(),
                ));
                collect_universe(&map.item_processor, branch_universe, containers);
            }
            State::Parallel(parallel) => {
                let mut universe: Vec<String> = Vec::new();
                for sub in &parallel.branches {
                    for inner in sub.states.names() {
                        if !universe.iter().any(|u| u == inner) {
                            universe.push(inner.to_string());
                        }
                    }
                }
                containers.push((name.to_string(), universe));
                for sub in &parallel.branches {
                    collect_universe(sub, branch_universe, containers);
                }
            }
            _ => {}
        }
    }
}
