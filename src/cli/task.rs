//! pilot-tasks command implementations.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::board::BoardManager;
use crate::cli::{ListArgs, NewArgs, UpdateArgs};
use crate::config::Config;
use crate::derive::TaskFilter;
use crate::error::{Error, Result};
use crate::task::{Actor, Dependency, DependencyKind, NewTask, Task, TaskUpdate};

/// Everything a command needs: the project, a board manager and the output
/// mode.
pub struct CommandContext {
    project: PathBuf,
    manager: BoardManager,
    json: bool,
}

impl CommandContext {
    pub fn open(project: Option<PathBuf>, json: bool, watch: bool) -> Result<Self> {
        let project = match project {
            Some(project) => project,
            None => std::env::current_dir()?,
        };

        let mut config = Config::load_from_project(&project);
        config.board.watch = watch;

        Ok(Self {
            project,
            manager: BoardManager::new(config),
            json,
        })
    }

    fn project(&self) -> &Path {
        &self.project
    }

    /// Print `value` as JSON, or the text lines otherwise.
    fn emit<T: Serialize>(&self, value: &T, lines: impl FnOnce() -> Vec<String>) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            for line in lines() {
                println!("{line}");
            }
        }
        Ok(())
    }
}

pub fn run_list(ctx: &CommandContext, args: ListArgs) -> Result<()> {
    let filter = TaskFilter {
        status: non_empty(args.status),
        priority: non_empty(args.priority),
        task_type: non_empty(args.task_type),
        labels: non_empty(args.label),
        assignee: non_empty(
            args.assignee
                .iter()
                .map(|value| parse_assignee(value))
                .collect::<Result<Vec<_>>>()?,
        ),
        parent_id: if args.no_parent {
            Some(None)
        } else {
            args.parent.map(Some)
        },
        search: args.search,
    };

    let tasks = ctx.manager.query_tasks(ctx.project(), &filter);
    ctx.emit(&tasks, || tasks.iter().map(task_line).collect())
}

pub fn run_ready(ctx: &CommandContext) -> Result<()> {
    let tasks = ctx.manager.ready_tasks(ctx.project());
    ctx.emit(&tasks, || tasks.iter().map(task_line).collect())
}

pub fn run_show(ctx: &CommandContext, id: &str) -> Result<()> {
    let task = ctx
        .manager
        .get_task(ctx.project(), id)
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    ctx.emit(&task, || task_details(&task))
}

pub fn run_new(ctx: &CommandContext, args: NewArgs) -> Result<()> {
    let input = NewTask {
        title: args.title,
        description: args.description,
        status: args.status,
        priority: args.priority,
        task_type: args.task_type,
        parent_id: args.parent,
        dependencies: [
            (DependencyKind::BlockedBy, args.blocked_by),
            (DependencyKind::Blocks, args.blocks),
            (DependencyKind::Related, args.related),
        ]
        .into_iter()
        .flat_map(|(kind, ids)| ids.into_iter().map(move |id| Dependency { kind, task_id: id }))
        .collect(),
        labels: args.label,
        assignee: args.assignee,
        estimate_minutes: args.estimate,
        created_by: Some(actor_flag(args.agent)),
    };

    let task = ctx.manager.create_task(ctx.project(), input)?;
    ctx.emit(&task, || vec![format!("Created {}", task.id)])
}

pub fn run_update(ctx: &CommandContext, args: UpdateArgs) -> Result<()> {
    let replacements = [
        (DependencyKind::BlockedBy, args.blocked_by),
        (DependencyKind::Blocks, args.blocks),
        (DependencyKind::Related, args.related),
    ];
    let dependencies = if args.clear_deps {
        Some(Vec::new())
    } else if replacements.iter().all(|(_, ids)| ids.is_empty()) {
        None
    } else {
        let current = ctx
            .manager
            .get_task(ctx.project(), &args.id)
            .ok_or_else(|| Error::NotFound(args.id.clone()))?;
        Some(replace_edges(&current.dependencies, replacements))
    };

    let update = TaskUpdate {
        title: args.title,
        description: args.description,
        status: args.status,
        priority: args.priority,
        task_type: args.task_type,
        parent_id: clearable(args.parent, args.clear_parent),
        dependencies,
        labels: if args.clear_labels {
            Some(Vec::new())
        } else {
            non_empty(args.label)
        },
        assignee: clearable(args.assignee, args.clear_assignee),
        estimate_minutes: clearable(args.estimate, args.clear_estimate),
    };
    if update.is_empty() {
        return Err(Error::InvalidArgument("nothing to update".to_string()));
    }

    let task = ctx.manager.update_task(ctx.project(), &args.id, update)?;
    ctx.emit(&task, || {
        let mut lines = vec![format!("Updated {}", task.id)];
        if let Some(epic) = task
            .parent_id
            .as_deref()
            .and_then(|parent| ctx.manager.get_task(ctx.project(), parent))
            .filter(|epic| epic.is_epic() && epic.closed_at == Some(task.updated_at))
        {
            lines.push(format!("Epic {} completed", epic.id));
        }
        lines
    })
}

pub fn run_comment(ctx: &CommandContext, id: &str, text: &str, agent: bool) -> Result<()> {
    let comment = ctx
        .manager
        .add_comment(ctx.project(), id, text, actor_flag(agent))?;
    ctx.emit(&comment, || vec![format!("Commented on {id}")])
}

pub fn run_delete(ctx: &CommandContext, id: &str) -> Result<()> {
    if !ctx.manager.delete_task(ctx.project(), id)? {
        return Err(Error::NotFound(id.to_string()));
    }
    ctx.emit(&serde_json::json!({ "id": id, "deleted": true }), || {
        vec![format!("Deleted {id}")]
    })
}

pub fn run_summary(ctx: &CommandContext) -> Result<()> {
    let summary = ctx.manager.agent_summary(ctx.project());
    ctx.emit(&serde_json::json!({ "summary": summary }), || {
        if summary.is_empty() {
            Vec::new()
        } else {
            vec![summary.clone()]
        }
    })
}

pub fn run_doctor(ctx: &CommandContext) -> Result<()> {
    let report = ctx.manager.check_integrity(ctx.project());
    ctx.emit(&report, || {
        let mut lines = vec![format!("Issues: {}", report.issue_count())];
        for dep in &report.dangling_dependencies {
            lines.push(format!("{} {} missing task {}", dep.task_id, dep.kind, dep.missing_id));
        }
        for parent in &report.dangling_parents {
            lines.push(format!("{} has missing parent {}", parent.task_id, parent.parent_id));
        }
        for cycle in &report.cycles {
            lines.push(format!("cycle: {}", cycle.join(" -> ")));
        }
        for id in &report.closed_at_mismatches {
            lines.push(format!("{id} closedAt does not match its status"));
        }
        lines
    })
}

pub fn run_watch(ctx: &CommandContext, duration: Option<u64>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<()>();
    ctx.manager.subscribe(move |_| {
        let _ = tx.send(());
    });

    let board = ctx.manager.load_board(ctx.project());
    if !ctx.json {
        println!("Watching {} ({} tasks)", ctx.project().display(), board.tasks.len());
    }

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                rx.recv_timeout(remaining).is_ok()
            }
            None => rx.recv().is_ok(),
        };
        if !received {
            continue;
        }

        let board = ctx.manager.load_board(ctx.project());
        let stats = serde_json::json!({
            "total": board.tasks.len(),
            "ready": board.ready_tasks.len(),
            "blocked": board.blocked_tasks.len(),
            "done": board.tasks.iter().filter(|task| task.is_done()).count(),
        });
        if ctx.json {
            println!("{stats}");
        } else {
            println!(
                "Board changed: {} tasks, {} ready, {} blocked, {} done",
                stats["total"], stats["ready"], stats["blocked"], stats["done"]
            );
        }
    }

    ctx.manager.dispose(Some(ctx.project()));
    Ok(())
}

/// Swap out the edges of every kind that has a non-empty replacement.
fn replace_edges(
    current: &[Dependency],
    replacements: [(DependencyKind, Vec<String>); 3],
) -> Vec<Dependency> {
    let replaced: Vec<DependencyKind> = replacements
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(kind, _)| *kind)
        .collect();

    current
        .iter()
        .filter(|dep| !replaced.contains(&dep.kind))
        .cloned()
        .chain(
            replacements
                .into_iter()
                .flat_map(|(kind, ids)| ids.into_iter().map(move |id| Dependency { kind, task_id: id })),
        )
        .collect()
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn parse_assignee(value: &str) -> Result<Option<Actor>> {
    if value.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value.parse().map(Some)
}

fn actor_flag(agent: bool) -> Actor {
    if agent {
        Actor::Agent
    } else {
        Actor::Human
    }
}

fn task_line(task: &Task) -> String {
    let mut line = format!("[{}][P{}] {} {}", task.status, task.priority, task.id, task.title);
    if let Some(parent) = task.parent_id.as_ref() {
        line.push_str(&format!(" (parent: {parent})"));
    }
    if let Some(assignee) = task.assignee {
        line.push_str(&format!(" (@{assignee})"));
    }
    line
}

fn task_details(task: &Task) -> Vec<String> {
    let mut lines = vec![
        task_line(task),
        format!("Type: {}", task.task_type),
        format!("Created: {}", task.created_at.to_rfc3339()),
    ];
    if let Some(estimate) = task.estimate_minutes {
        lines.push(format!("Estimate: {estimate}m"));
    }
    if !task.labels.is_empty() {
        lines.push(format!("Labels: {}", task.labels.join(", ")));
    }
    for dep in &task.dependencies {
        lines.push(format!("{}: {}", dep.kind, dep.task_id));
    }
    if !task.description.is_empty() {
        lines.push(task.description.clone());
    }
    for comment in &task.comments {
        lines.push(format!("[{}] {}: {}", comment.created_at.to_rfc3339(), comment.author, comment.text));
    }
    lines
}
