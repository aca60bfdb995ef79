//! Structural analysis of compiled state machines.
//!
//! Detects the Choice patterns that make mock-driven testing hang: a
//! Choice comparing timestamps against `$$.Execution.StartTime` inside a
//! `Wait` → `Choice` cycle can never progress under a virtual clock,
//! because the start time is fixed for the whole run.

use crate::asl::choice::{ChoiceTest, CompareSubject};
use crate::asl::machine::{Branch, StateMachine};
use crate::asl::state::State;

/// One detected problem pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternFinding {
    /// The Choice state anchoring the pattern.
    pub state: String,
    pub description: String,
}

/// Result of a structural scan.
#[derive(Clone, Debug, Default)]
pub struct PatternReport {
    pub has_problematic_patterns: bool,
    pub findings: Vec<PatternFinding>,
}

/// Scan the machine (including Map processors and Parallel branches) for
/// problematic Choice loops.
#[must_use]
pub fn analyze(machine: &StateMachine) -> PatternReport {
    let mut findings = Vec::new();
    scan_branch(&machine.as_branch(), "", &mut findings);
    PatternReport {
        has_problematic_patterns: !findings.is_empty(),
        findings,
    }
}

fn scan_branch(branch: &Branch, prefix: &str, findings: &mut Vec<PatternFinding>) {
    for (name, state) in branch.states.iter() {
        let qualified = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        match state {
            State::Choice(choice) => {
                let anchored = choice
                    .choices
                    .iter()
                    .any(|rule| references_start_time(&rule.test));
                if anchored && cycle_through_wait(branch, name) {
                    findings.push(PatternFinding {
                        state: qualified,
                        description: format!(
                            "Choice state '{name}' compares against $$.Execution.StartTime \
                             inside a Wait loop; the condition can never change under a \
                             virtual clock"
                        ),
                    });
                }
            }
            State::Map(map) => scan_branch(&map.item_processor, &qualified, findings),
            State::Parallel(parallel) => {
                for (index, sub) in parallel.branches.iter().enumerate() {
                    scan_branch(sub, &format!("{qualified}/{index}"), findings);
                }
            }
            _ => {}
        }
    }
}

fn references_start_time(test: &ChoiceTest) -> bool {
    match test {
        ChoiceTest::Condition(cond) => cond.contains("$states.context.Execution.StartTime"),
        ChoiceTest::And(tests) | ChoiceTest::Or(tests) => {
            tests.iter().any(references_start_time)
        }
        ChoiceTest::Not(inner) => references_start_time(inner),
        ChoiceTest::Compare {
            subject,
            by_path,
            value,
            ..
        } => {
            *subject == CompareSubject::Timestamp
                && *by_path
                && value
                    .as_str()
                    .is_some_and(|p| p.starts_with("$$.Execution.StartTime"))
        }
        ChoiceTest::Unary { .. } => false,
    }
}

/// Whether a cycle exists from `start` back to itself that passes through
/// at least one Wait state.
fn cycle_through_wait(branch: &Branch, start: &str) -> bool {
    let mut stack: Vec<(String, bool)> = successors(branch, start)
        .into_iter()
        .map(|s| (s, false))
        .collect();
    let mut visited: Vec<(String, bool)> = Vec::new();
    while let Some((name, mut saw_wait)) = stack.pop() {
        if let Some(State::Wait(_)) = branch.states.get(&name) {
            saw_wait = true;
        }
        if name == start {
            if saw_wait {
                return true;
            }
            continue;
        }
        if visited.iter().any(|(n, w)| *n == name && *w == saw_wait) {
            continue;
        }
        visited.push((name.clone(), saw_wait));
        for next in successors(branch, &name) {
            stack.push((next, saw_wait));
        }
    }
    false
}

fn successors(branch: &Branch, name: &str) -> Vec<String> {
    let Some(state) = branch.states.get(name) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let common = state.common();
    if let Some(next) = &common.next {
        out.push(next.clone());
    }
    for rule in &common.catch {
        out.push(rule.next.clone());
    }
    if let State::Choice(choice) = state {
        for rule in &choice.choices {
            out.push(rule.next.clone());
        }
        if let Some(default) = &choice.default {
            out.push(default.clone());
        }
    }
    out
}
