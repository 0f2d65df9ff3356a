//! Derived board state.
//!
//! Pure functions over a task collection snapshot: ready/blocked/epic sets,
//! filtering, dependency chains, epic progress, cycle checks and epic
//! auto-completion. Only `blocked_by` edges carry behavior.
//!
//! A `blocked_by` edge to a missing task does not keep a task out of the
//! ready set, yet it does put an open or in-progress task into the blocked
//! set. `integrity::check_integrity` reports such edges.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::{Actor, Task, TaskStatus, TaskType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedState {
    pub ready: Vec<Task>,
    pub blocked: Vec<Task>,
    pub epics: Vec<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Vec<TaskStatus>>,
    pub priority: Option<Vec<u8>>,
    pub task_type: Option<Vec<TaskType>>,
    /// Matches when the task carries any of these labels.
    pub labels: Option<Vec<String>>,
    /// `Some(None)` inside the set matches unassigned tasks.
    pub assignee: Option<Vec<Option<Actor>>>,
    /// `Some(None)` matches top-level tasks; `None` does not filter.
    pub parent_id: Option<Option<String>>,
    /// Case-insensitive substring of id, title or description.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyChain {
    pub blockers: Vec<Task>,
    pub dependents: Vec<Task>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicProgress {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub review: usize,
    pub done: usize,
    pub percent_complete: u32,
}

fn index_by_id(tasks: &[Task]) -> HashMap<&str, &Task> {
    tasks.iter().map(|task| (task.id.as_str(), task)).collect()
}

fn is_ready(task: &Task, index: &HashMap<&str, &Task>) -> bool {
    task.status == TaskStatus::Open
        && task
            .blocked_by_ids()
            .all(|id| index.get(id).map(|blocker| blocker.is_done()).unwrap_or(true))
}

fn is_blocked(task: &Task, index: &HashMap<&str, &Task>) -> bool {
    matches!(task.status, TaskStatus::Open | TaskStatus::InProgress)
        && !unresolved_in(task, index).is_empty()
}

fn unresolved_in(task: &Task, index: &HashMap<&str, &Task>) -> Vec<String> {
    task.blocked_by_ids()
        .filter(|id| index.get(id).map(|blocker| !blocker.is_done()).unwrap_or(true))
        .map(str::to_string)
        .collect()
}

/// Blockers of `task` that are missing or not yet done.
pub fn unresolved_blockers(tasks: &[Task], task: &Task) -> Vec<String> {
    unresolved_in(task, &index_by_id(tasks))
}

pub fn compute_derived(tasks: &[Task]) -> DerivedState {
    let index = index_by_id(tasks);

    let mut ready: Vec<Task> = tasks
        .iter()
        .filter(|task| is_ready(task, &index))
        .cloned()
        .collect();
    ready.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| left.created_at.cmp(&right.created_at))
    });

    let blocked = tasks
        .iter()
        .filter(|task| is_blocked(task, &index))
        .cloned()
        .collect();

    let epics = tasks.iter().filter(|task| task.is_epic()).cloned().collect();

    DerivedState {
        ready,
        blocked,
        epics,
    }
}

fn in_set<T: PartialEq>(set: &Option<Vec<T>>, value: &T) -> bool {
    match set {
        Some(values) if !values.is_empty() => values.contains(value),
        _ => true,
    }
}

fn matches_filter(task: &Task, filter: &TaskFilter, needle: Option<&str>) -> bool {
    if !in_set(&filter.status, &task.status)
        || !in_set(&filter.priority, &task.priority)
        || !in_set(&filter.task_type, &task.task_type)
        || !in_set(&filter.assignee, &task.assignee)
    {
        return false;
    }

    if let Some(labels) = filter.labels.as_ref().filter(|labels| !labels.is_empty()) {
        if !task.labels.iter().any(|label| labels.contains(label)) {
            return false;
        }
    }

    if let Some(parent_id) = &filter.parent_id {
        if task.parent_id != *parent_id {
            return false;
        }
    }

    if let Some(needle) = needle {
        let hit = task.id.to_lowercase().contains(needle)
            || task.title.to_lowercase().contains(needle)
            || task.description.to_lowercase().contains(needle);
        if !hit {
            return false;
        }
    }

    true
}

pub fn filter_tasks(tasks: &[Task], filter: &TaskFilter) -> Vec<Task> {
    let needle = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty())
        .map(str::to_lowercase);

    tasks
        .iter()
        .filter(|task| matches_filter(task, filter, needle.as_deref()))
        .cloned()
        .collect()
}

pub fn dependency_chain(tasks: &[Task], task_id: &str) -> DependencyChain {
    let index = index_by_id(tasks);
    let Some(task) = index.get(task_id) else {
        return DependencyChain::default();
    };

    let blockers = task
        .blocked_by_ids()
        .filter_map(|id| index.get(id).map(|blocker| (*blocker).clone()))
        .collect();

    let dependents = tasks
        .iter()
        .filter(|other| other.id != task_id && other.blocked_by_ids().any(|id| id == task_id))
        .cloned()
        .collect();

    DependencyChain {
        blockers,
        dependents,
    }
}

pub fn epic_progress(tasks: &[Task], epic_id: &str) -> EpicProgress {
    let mut progress = EpicProgress::default();
    for child in tasks
        .iter()
        .filter(|task| task.parent_id.as_deref() == Some(epic_id))
    {
        progress.total += 1;
        match child.status {
            TaskStatus::Open => progress.open += 1,
            TaskStatus::InProgress => progress.in_progress += 1,
            TaskStatus::Review => progress.review += 1,
            TaskStatus::Done => progress.done += 1,
        }
    }
    if progress.total > 0 {
        progress.percent_complete =
            ((progress.done as f64 / progress.total as f64) * 100.0).round() as u32;
    }
    progress
}

/// Whether `start_id` is reachable from `target_id` along `blocked_by` edges,
/// i.e. whether making `start_id` blocked by `target_id` would close a cycle.
pub fn has_cycle(tasks: &[Task], start_id: &str, target_id: &str) -> bool {
    let index = index_by_id(tasks);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![target_id];

    while let Some(current) = stack.pop() {
        if current == start_id {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(task) = index.get(current) {
            for blocker in task.blocked_by_ids() {
                if !visited.contains(blocker) {
                    stack.push(blocker);
                }
            }
        }
    }

    false
}

/// Reject `task` if any of its `blocked_by` edges would close a cycle.
pub fn validate_no_cycles(tasks: &[Task], task: &Task) -> Result<()> {
    for blocker in task.blocked_by_ids() {
        if has_cycle(tasks, &task.id, blocker) {
            return Err(Error::CircularDependency {
                task_id: task.id.clone(),
                blocker_id: blocker.to_string(),
            });
        }
    }
    Ok(())
}

/// The epic closed as a derived write, if every child of a still-open epic
/// is done. The input is not modified.
pub fn check_epic_auto_completion(
    tasks: &[Task],
    epic_id: &str,
    now: DateTime<Utc>,
) -> Option<Task> {
    let epic = tasks.iter().find(|task| task.id == epic_id)?;
    if !epic.is_epic() || epic.is_done() {
        return None;
    }

    let mut children = tasks
        .iter()
        .filter(|task| task.parent_id.as_deref() == Some(epic_id))
        .peekable();
    children.peek()?;
    if !children.all(Task::is_done) {
        return None;
    }

    let mut closed = epic.clone();
    closed.close(now);
    Some(closed)
}
