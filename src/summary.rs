//! Compact board digest for agent prompts.

use std::fmt::Write;

use crate::board::TaskBoard;
use crate::derive;
use crate::task::{Task, TaskStatus};

/// Render the `<tasks>` block, or an empty string for an empty board.
pub fn format_agent_summary(board: &TaskBoard) -> String {
    if board.is_empty() {
        return String::new();
    }

    let mut sections: Vec<String> = Vec::new();

    let in_progress: Vec<&Task> = with_status(board, TaskStatus::InProgress);
    if !in_progress.is_empty() {
        sections.push(section("IN PROGRESS", &in_progress, |_| None));
    }

    let review: Vec<&Task> = with_status(board, TaskStatus::Review);
    if !review.is_empty() {
        sections.push(section("IN REVIEW", &review, |_| None));
    }

    if !board.ready_tasks.is_empty() {
        let ready: Vec<&Task> = board.ready_tasks.iter().collect();
        sections.push(section("READY", &ready, |_| None));
    }

    if !board.blocked_tasks.is_empty() {
        let blocked: Vec<&Task> = board.blocked_tasks.iter().collect();
        sections.push(section("BLOCKED", &blocked, |task| {
            let blockers = derive::unresolved_blockers(&board.tasks, task);
            Some(format!(" (blocked by: {})", blockers.join(", ")))
        }));
    }

    let done = board.tasks.iter().filter(|task| task.is_done()).count();
    if done > 0 {
        sections.push(format!("DONE: {done}\n"));
    }

    let mut out = String::from("<tasks>\n");
    out.push_str(&sections.join("\n"));
    out.push_str("</tasks>");
    out
}

fn with_status(board: &TaskBoard, status: TaskStatus) -> Vec<&Task> {
    board
        .tasks
        .iter()
        .filter(|task| task.status == status)
        .collect()
}

fn section(heading: &str, tasks: &[&Task], suffix: impl Fn(&Task) -> Option<String>) -> String {
    let mut out = format!("{heading}:\n");
    for task in tasks {
        let _ = writeln!(
            out,
            "- [{}] P{} {}{}",
            task.id,
            task.priority,
            task.title,
            suffix(task).unwrap_or_default()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Dependency, NewTask};
    use chrono::{TimeZone, Utc};

    fn task(id: &str, priority: u8, status: TaskStatus, blocked_by: &[&str]) -> Task {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let input = NewTask {
            priority: Some(priority),
            status: Some(status),
            dependencies: blocked_by.iter().map(|id| Dependency::blocked_by(*id)).collect(),
            ..NewTask::new(format!("Title {id}"))
        };
        Task::create(id.to_string(), input, now).unwrap()
    }

    #[test]
    fn empty_board_is_empty_string() {
        let board = TaskBoard::new("/p", Vec::new());
        assert_eq!(format_agent_summary(&board), "");
    }

    #[test]
    fn renders_sections_in_order() {
        let board = TaskBoard::new(
            "/p",
            vec![
                task("a", 1, TaskStatus::InProgress, &[]),
                task("b", 2, TaskStatus::Review, &[]),
                task("c", 0, TaskStatus::Open, &[]),
                task("d", 2, TaskStatus::Open, &["a", "ghost"]),
                task("e", 3, TaskStatus::Done, &[]),
                task("f", 3, TaskStatus::Done, &[]),
            ],
        );

        let expected = "<tasks>\n\
IN PROGRESS:\n\
- [a] P1 Title a\n\
\n\
IN REVIEW:\n\
- [b] P2 Title b\n\
\n\
READY:\n\
- [c] P0 Title c\n\
\n\
BLOCKED:\n\
- [d] P2 Title d (blocked by: a, ghost)\n\
\n\
DONE: 2\n\
</tasks>";
        assert_eq!(format_agent_summary(&board), expected);
    }

    #[test]
    fn omits_empty_sections() {
        let board = TaskBoard::new("/p", vec![task("only", 2, TaskStatus::Open, &[])]);
        assert_eq!(
            format_agent_summary(&board),
            "<tasks>\nREADY:\n- [only] P2 Title only\n</tasks>"
        );
    }
}
