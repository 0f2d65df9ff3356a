//! Board integrity report.
//!
//! The log can be edited by hand or by another process, so it may hold
//! references the board manager would never produce itself. This module only
//! reports them; readiness and blocking keep their runtime semantics.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::task::{DependencyKind, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingDependency {
    pub task_id: String,
    pub kind: DependencyKind,
    pub missing_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingParent {
    pub task_id: String,
    pub parent_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub dangling_dependencies: Vec<DanglingDependency>,
    pub dangling_parents: Vec<DanglingParent>,
    /// Each `blocked_by` cycle once, rotated to start at its smallest id.
    pub cycles: Vec<Vec<String>>,
    /// Tasks whose `closedAt` disagrees with their status.
    pub closed_at_mismatches: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_dependencies.is_empty()
            && self.dangling_parents.is_empty()
            && self.cycles.is_empty()
            && self.closed_at_mismatches.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.dangling_dependencies.len()
            + self.dangling_parents.len()
            + self.cycles.len()
            + self.closed_at_mismatches.len()
    }
}

pub fn check_integrity(tasks: &[Task]) -> IntegrityReport {
    let index: HashMap<&str, &Task> = tasks.iter().map(|task| (task.id.as_str(), task)).collect();
    let mut report = IntegrityReport::default();

    for task in tasks {
        for dep in &task.dependencies {
            if !index.contains_key(dep.task_id.as_str()) {
                report.dangling_dependencies.push(DanglingDependency {
                    task_id: task.id.clone(),
                    kind: dep.kind,
                    missing_id: dep.task_id.clone(),
                });
            }
        }

        if let Some(parent_id) = &task.parent_id {
            if !index.contains_key(parent_id.as_str()) {
                report.dangling_parents.push(DanglingParent {
                    task_id: task.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        if task.is_done() != task.closed_at.is_some() {
            report.closed_at_mismatches.push(task.id.clone());
        }
    }

    report.cycles = find_cycles(tasks, &index);
    report
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over `blocked_by` edges with an explicit stack, so
/// long hand-written chains cannot exhaust the thread stack.
fn find_cycles<'a>(tasks: &'a [Task], index: &HashMap<&'a str, &'a Task>) -> Vec<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles = Vec::new();

    for task in tasks {
        let root = task.id.as_str();
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root, Mark::Visiting);
        // Each frame is a task on the current path and its unvisited blockers.
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(root, pending_blockers(index, root))];

        while let Some(frame) = stack.last_mut() {
            let id = frame.0;
            let Some(blocker) = frame.1.pop() else {
                marks.insert(id, Mark::Done);
                stack.pop();
                continue;
            };
            match marks.get(blocker).copied() {
                Some(Mark::Visiting) => {
                    let path: Vec<&str> = stack.iter().map(|(id, _)| *id).collect();
                    record_cycle(&path, blocker, &mut seen, &mut cycles);
                }
                Some(Mark::Done) => {}
                None if index.contains_key(blocker) => {
                    marks.insert(blocker, Mark::Visiting);
                    stack.push((blocker, pending_blockers(index, blocker)));
                }
                None => {}
            }
        }
    }
    cycles
}

/// Blockers of `id` in reverse, so popping visits them in declared order.
fn pending_blockers<'a>(index: &HashMap<&'a str, &'a Task>, id: &str) -> Vec<&'a str> {
    let mut blockers: Vec<&'a str> = index
        .get(id)
        .map(|task| task.blocked_by_ids().collect())
        .unwrap_or_default();
    blockers.reverse();
    blockers
}

fn record_cycle(
    path: &[&str],
    start: &str,
    seen: &mut HashSet<Vec<String>>,
    cycles: &mut Vec<Vec<String>>,
) {
    let Some(pos) = path.iter().position(|id| *id == start) else {
        return;
    };
    let mut cycle: Vec<String> = path[pos..].iter().map(|id| id.to_string()).collect();
    if let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(pos, _)| pos)
    {
        cycle.rotate_left(min_pos);
    }
    if seen.insert(cycle.clone()) {
        cycles.push(cycle);
    }
}
