//! Task record model.
//!
//! A task is persisted as one JSON object per line in `.pilot/tasks/tasks.jsonl`
//! using camelCase keys, so the log stays readable by the desktop app and by
//! hand. Every mutation produces a complete record; the newest record for an
//! id wins on replay.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

pub const DEFAULT_TASK_PRIORITY: u8 = 2;
pub const MAX_TASK_PRIORITY: u8 = 4;

fn default_task_priority() -> u8 {
    DEFAULT_TASK_PRIORITY
}

/// Current time at the millisecond precision used on the wire.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Generate a task id: `<prefix>-<lowercase ulid>`.
///
/// ULIDs carry 80 random bits, so ids minted concurrently by separate
/// processes do not collide without any shared counter.
pub fn generate_task_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix.trim(),
        Ulid::new().to_string().to_ascii_lowercase()
    )
}

pub fn generate_comment_id() -> String {
    Ulid::new().to_string().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Epic,
    #[default]
    Task,
    Bug,
    Feature,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Epic => "epic",
            TaskType::Task => "task",
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
        }
    }
}

/// Who created, owns or commented on a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    #[default]
    Human,
    Agent,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Human => "human",
            Actor::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Blocks,
    BlockedBy,
    Related,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
            DependencyKind::BlockedBy => "blocked_by",
            DependencyKind::Related => "related",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $label:literal, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                let trimmed = value.trim();
                [$($variant),+]
                    .into_iter()
                    .find(|candidate: &$ty| candidate.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(concat!("unknown ", $label, " '{}'"), trimmed))
                    })
            }
        }
    };
}

impl_str_enum!(
    TaskStatus,
    "task status",
    [TaskStatus::Open, TaskStatus::InProgress, TaskStatus::Review, TaskStatus::Done]
);
impl_str_enum!(
    TaskType,
    "task type",
    [TaskType::Epic, TaskType::Task, TaskType::Bug, TaskType::Feature]
);
impl_str_enum!(Actor, "actor", [Actor::Human, Actor::Agent]);
impl_str_enum!(
    DependencyKind,
    "dependency type",
    [DependencyKind::Blocks, DependencyKind::BlockedBy, DependencyKind::Related]
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    pub task_id: String,
}

impl Dependency {
    pub fn blocked_by(task_id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::BlockedBy,
            task_id: task_id.into(),
        }
    }

    pub fn blocks(task_id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Blocks,
            task_id: task_id.into(),
        }
    }

    pub fn related(task_id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Related,
            task_id: task_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: Actor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default = "default_task_priority")]
    pub priority: u8,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee: Option<Actor>,
    #[serde(default)]
    pub estimate_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Actor,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Input for creating a task. Unset fields take the board defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<u8>,
    pub task_type: Option<TaskType>,
    pub parent_id: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub labels: Vec<String>,
    pub assignee: Option<Actor>,
    pub estimate_minutes: Option<u32>,
    pub created_by: Option<Actor>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<u8>,
    pub task_type: Option<TaskType>,
    pub parent_id: Option<Option<String>>,
    pub dependencies: Option<Vec<Dependency>>,
    pub labels: Option<Vec<String>>,
    pub assignee: Option<Option<Actor>>,
    pub estimate_minutes: Option<Option<u32>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.task_type.is_none()
            && self.parent_id.is_none()
            && self.dependencies.is_none()
            && self.labels.is_none()
            && self.assignee.is_none()
            && self.estimate_minutes.is_none()
    }
}

fn normalize_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_priority(priority: u8) -> Result<u8> {
    if priority > MAX_TASK_PRIORITY {
        return Err(Error::InvalidArgument(format!(
            "unknown task priority '{priority}' (expected 0-{MAX_TASK_PRIORITY})"
        )));
    }
    Ok(priority)
}

fn validate_estimate(estimate: Option<u32>) -> Result<Option<u32>> {
    if estimate == Some(0) {
        return Err(Error::InvalidArgument(
            "estimate must be a positive number of minutes".to_string(),
        ));
    }
    Ok(estimate)
}

fn closed_at_for(
    previous: TaskStatus,
    next: TaskStatus,
    closed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (previous == TaskStatus::Done, next == TaskStatus::Done) {
        (false, true) => Some(now),
        (true, false) => None,
        _ => closed_at,
    }
}

impl Task {
    /// Build a new task from creation input, applying defaults.
    pub fn create(id: String, input: NewTask, now: DateTime<Utc>) -> Result<Self> {
        let title = normalize_title(&input.title)?;
        let priority = validate_priority(input.priority.unwrap_or(DEFAULT_TASK_PRIORITY))?;
        let estimate_minutes = validate_estimate(input.estimate_minutes)?;
        let status = input.status.unwrap_or_default();
        let closed_at = (status == TaskStatus::Done).then_some(now);

        Ok(Task {
            id,
            title,
            description: input.description.unwrap_or_default(),
            status,
            priority,
            task_type: input.task_type.unwrap_or_default(),
            parent_id: input.parent_id,
            dependencies: input.dependencies,
            labels: input.labels,
            assignee: input.assignee,
            estimate_minutes,
            created_at: now,
            updated_at: now,
            closed_at,
            created_by: input.created_by.unwrap_or_default(),
            comments: Vec::new(),
        })
    }

    /// Apply the fields present in `update`. Validation happens before any
    /// field changes, so a rejected update leaves the task untouched.
    pub fn apply_update(&mut self, update: TaskUpdate, now: DateTime<Utc>) -> Result<()> {
        let title = update.title.as_deref().map(normalize_title).transpose()?;
        let priority = update.priority.map(validate_priority).transpose()?;
        let estimate = update
            .estimate_minutes
            .map(validate_estimate)
            .transpose()?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(status) = update.status {
            self.closed_at = closed_at_for(self.status, status, self.closed_at, now);
            self.status = status;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(task_type) = update.task_type {
            self.task_type = task_type;
        }
        if let Some(parent_id) = update.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(dependencies) = update.dependencies {
            self.dependencies = dependencies;
        }
        if let Some(labels) = update.labels {
            self.labels = labels;
        }
        if let Some(assignee) = update.assignee {
            self.assignee = assignee;
        }
        if let Some(estimate) = estimate {
            self.estimate_minutes = estimate;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Append a comment and refresh `updatedAt`.
    pub fn push_comment(&mut self, text: &str, author: Actor, now: DateTime<Utc>) -> Result<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument("comment cannot be empty".to_string()));
        }
        let comment = Comment {
            id: generate_comment_id(),
            text: text.to_string(),
            author,
            created_at: now,
        };
        self.comments.push(comment.clone());
        self.updated_at = now;
        Ok(comment)
    }

    /// Mark the task done as a derived write (epic auto-completion).
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.closed_at = closed_at_for(self.status, TaskStatus::Done, self.closed_at, now);
        self.status = TaskStatus::Done;
        self.updated_at = now;
    }

    /// Ids this task is blocked by, in declaration order.
    pub fn blocked_by_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::BlockedBy)
            .map(|dep| dep.task_id.as_str())
    }

    pub fn has_blocked_by(&self) -> bool {
        self.blocked_by_ids().next().is_some()
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_epic(&self) -> bool {
        self.task_type == TaskType::Epic
    }

    /// Drop every dependency edge pointing at `task_id`. Returns true if any
    /// edge was removed.
    pub fn remove_dependencies_on(&mut self, task_id: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|dep| dep.task_id != task_id);
        self.dependencies.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn create_applies_defaults() {
        let task = Task::create("task-1".to_string(), NewTask::new("  Write docs "), at(0))
            .expect("create");
        assert_eq!(task.title, "Write docs");
        assert_eq!(task.description, "");
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.priority, 2);
        assert_eq!(task.task_type, TaskType::Task);
        assert!(task.dependencies.is_empty());
        assert!(task.labels.is_empty());
        assert_eq!(task.assignee, None);
        assert_eq!(task.estimate_minutes, None);
        assert_eq!(task.closed_at, None);
        assert_eq!(task.created_by, Actor::Human);
        assert!(task.comments.is_empty());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn create_rejects_bad_input() {
        let err = Task::create("t".to_string(), NewTask::new("   "), at(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let input = NewTask {
            priority: Some(5),
            ..NewTask::new("Too low")
        };
        assert!(Task::create("t".to_string(), input, at(0)).is_err());

        let input = NewTask {
            estimate_minutes: Some(0),
            ..NewTask::new("Zero estimate")
        };
        assert!(Task::create("t".to_string(), input, at(0)).is_err());
    }

    #[test]
    fn created_done_task_is_closed() {
        let input = NewTask {
            status: Some(TaskStatus::Done),
            ..NewTask::new("Already shipped")
        };
        let task = Task::create("t".to_string(), input, at(3)).expect("create");
        assert_eq!(task.closed_at, Some(at(3)));
    }

    #[test]
    fn closed_at_follows_status_transitions() {
        let mut task = Task::create("t".to_string(), NewTask::new("Flip"), at(0)).unwrap();

        task.apply_update(TaskUpdate::status(TaskStatus::Done), at(1))
            .unwrap();
        assert_eq!(task.closed_at, Some(at(1)));

        // Staying done keeps the original close time
        task.apply_update(TaskUpdate::status(TaskStatus::Done), at(2))
            .unwrap();
        assert_eq!(task.closed_at, Some(at(1)));

        task.apply_update(TaskUpdate::status(TaskStatus::Review), at(3))
            .unwrap();
        assert_eq!(task.closed_at, None);
        assert_eq!(task.updated_at, at(3));
    }

    #[test]
    fn partial_update_leaves_absent_fields() {
        let input = NewTask {
            description: Some("keep me".to_string()),
            parent_id: Some("epic-1".to_string()),
            assignee: Some(Actor::Agent),
            labels: vec!["ui".to_string()],
            ..NewTask::new("Original")
        };
        let mut task = Task::create("t".to_string(), input, at(0)).unwrap();

        let update = TaskUpdate {
            title: Some("Renamed".to_string()),
            assignee: Some(None),
            ..TaskUpdate::default()
        };
        task.apply_update(update, at(5)).unwrap();

        assert_eq!(task.title, "Renamed");
        assert_eq!(task.description, "keep me");
        assert_eq!(task.parent_id.as_deref(), Some("epic-1"));
        assert_eq!(task.assignee, None);
        assert_eq!(task.labels, vec!["ui".to_string()]);
        assert_eq!(task.updated_at, at(5));
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let mut task = Task::create("t".to_string(), NewTask::new("Stable"), at(0)).unwrap();
        let before = task.clone();
        let update = TaskUpdate {
            title: Some("New".to_string()),
            priority: Some(9),
            ..TaskUpdate::default()
        };
        assert!(task.apply_update(update, at(1)).is_err());
        assert_eq!(task, before);
    }

    #[test]
    fn push_comment_refreshes_updated_at() {
        let mut task = Task::create("t".to_string(), NewTask::new("Talk"), at(0)).unwrap();
        let comment = task.push_comment("looks good", Actor::Agent, at(9)).unwrap();
        assert_eq!(task.comments, vec![comment.clone()]);
        assert_eq!(comment.author, Actor::Agent);
        assert_eq!(task.updated_at, at(9));
        assert!(task.push_comment("  ", Actor::Human, at(10)).is_err());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let input = NewTask {
            dependencies: vec![Dependency::blocked_by("task-0")],
            estimate_minutes: Some(30),
            ..NewTask::new("Wire")
        };
        let task = Task::create("task-1".to_string(), input, at(0)).unwrap();
        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["type"], "task");
        assert_eq!(value["status"], "open");
        assert_eq!(value["dependencies"][0]["type"], "blocked_by");
        assert_eq!(value["dependencies"][0]["taskId"], "task-0");
        assert_eq!(value["estimateMinutes"], 30);
        assert_eq!(value["createdBy"], "human");
        assert!(value["assignee"].is_null());
        assert!(value["closedAt"].is_null());
        assert!(value.get("parentId").is_none());
        assert_eq!(value["createdAt"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn deserializes_sparse_record() {
        let line = r#"{"id":"x","title":"Hand written","createdAt":"2024-01-01T00:00:00.000Z","updatedAt":"2024-01-01T00:00:00.000Z","parentId":null}"#;
        let task: Task = serde_json::from_str(line).unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.priority, 2);
        assert_eq!(task.task_type, TaskType::Task);
        assert_eq!(task.parent_id, None);
        assert_eq!(task.created_by, Actor::Human);
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = generate_task_id("task");
        let b = generate_task_id("task");
        assert_ne!(a, b);
        assert!(a.starts_with("task-"));
        assert_eq!(a.len(), "task-".len() + 26);
        assert_eq!(a, a.to_ascii_lowercase());
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("IN_PROGRESS".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("epic".parse::<TaskType>().unwrap(), TaskType::Epic);
        assert_eq!("Agent".parse::<Actor>().unwrap(), Actor::Agent);
        assert_eq!(
            "blocked_by".parse::<DependencyKind>().unwrap(),
            DependencyKind::BlockedBy
        );
        assert!("closed".parse::<TaskStatus>().is_err());
    }
}
