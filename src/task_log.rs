//! Append-only task log with last-write-wins replay.
//!
//! Every create, update and comment appends the full task record. Replaying
//! the log folds records by id, later lines replacing earlier ones. Deletes
//! cannot be expressed as an appended record, so they go through `compact`,
//! which rewrites the whole file.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::lock::FileLock;
use crate::storage::Storage;
use crate::task::Task;

/// Size and modification time of the log, used to recognize our own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Result of `TaskLog::append_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Stamp right after the append, taken under the lock.
    pub stamp: Option<LogStamp>,
    /// The log had changed since the caller last saw it.
    pub foreign: bool,
}

#[derive(Debug, Clone)]
pub struct TaskLog {
    storage: Storage,
    lock_timeout_ms: u64,
}

impl TaskLog {
    pub fn new(storage: Storage, lock_timeout_ms: u64) -> Self {
        Self {
            storage,
            lock_timeout_ms,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn path(&self) -> PathBuf {
        self.storage.tasks_log()
    }

    /// Append one task record, creating `.pilot/tasks/` if needed.
    pub fn append(&self, task: &Task) -> Result<()> {
        self.append_after(task, self.stamp()).map(|_| ())
    }

    /// Append one task record after checking, under the lock, whether the
    /// log still carries `seen`.
    pub fn append_after(&self, task: &Task, seen: Option<LogStamp>) -> Result<Appended> {
        self.storage.ensure_tasks_dir()?;
        let _lock = FileLock::acquire(self.storage.tasks_lock(), self.lock_timeout_ms)?;
        let foreign = self.stamp() != seen;
        self.storage.append_jsonl(&self.path(), task)?;
        Ok(Appended {
            stamp: self.stamp(),
            foreign,
        })
    }

    /// Replay the log. A missing or unreadable log is an empty board.
    pub fn read_all(&self) -> Vec<Task> {
        self.replay().unwrap_or_else(|err| {
            tracing::warn!(
                path = %self.path().display(),
                error = %err,
                "task log unreadable, treating as empty"
            );
            Vec::new()
        })
    }

    /// Rewrite the log as exactly one record per task, in the given order.
    pub fn compact(&self, tasks: &[Task]) -> Result<()> {
        self.storage.ensure_tasks_dir()?;
        let _lock = FileLock::acquire(self.storage.tasks_lock(), self.lock_timeout_ms)?;
        self.storage.write_jsonl_atomic(&self.path(), tasks)
    }

    /// Replay the log and compact it to `f` of the replayed tasks, both under
    /// the lock, so records appended by other writers are kept. Returns the
    /// tasks written and the resulting stamp.
    pub fn rewrite<F>(&self, f: F) -> Result<(Vec<Task>, Option<LogStamp>)>
    where
        F: FnOnce(Vec<Task>) -> Vec<Task>,
    {
        self.storage.ensure_tasks_dir()?;
        let _lock = FileLock::acquire(self.storage.tasks_lock(), self.lock_timeout_ms)?;
        let tasks = f(self.replay()?);
        self.storage.write_jsonl_atomic(&self.path(), &tasks)?;
        Ok((tasks, self.stamp()))
    }

    pub fn stamp(&self) -> Option<LogStamp> {
        stamp_of(&self.path())
    }

    fn replay(&self) -> io::Result<Vec<Task>> {
        self.storage
            .read_jsonl_lenient::<Task>(&self.path())
            .map(fold_latest)
    }
}

fn stamp_of(path: &Path) -> Option<LogStamp> {
    let meta = std::fs::metadata(path).ok()?;
    Some(LogStamp {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// Keep the last record per id at the position the id was first seen.
fn fold_latest(records: Vec<Task>) -> Vec<Task> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut tasks: Vec<Task> = Vec::new();
    for record in records {
        match index.get(&record.id) {
            Some(&slot) => tasks[slot] = record,
            None => {
                index.insert(record.id.clone(), tasks.len());
                tasks.push(record);
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus, TaskUpdate};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn task(id: &str, title: &str) -> Task {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Task::create(id.to_string(), NewTask::new(title), now).unwrap()
    }

    fn log_in(temp: &TempDir) -> TaskLog {
        TaskLog::new(Storage::new(temp.path()), 1000)
    }

    #[test]
    fn missing_log_reads_empty() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        assert!(log.read_all().is_empty());
        assert!(log.stamp().is_none());
    }

    #[test]
    fn later_records_win_and_keep_first_position() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);

        let a = task("a", "A");
        let b = task("b", "B");
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let mut a2 = a.clone();
        a2.apply_update(TaskUpdate::status(TaskStatus::Done), a.created_at)
            .unwrap();
        log.append(&a2).unwrap();

        let tasks = log.read_all();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "a");
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[1].id, "b");
    }

    #[test]
    fn compact_rewrites_one_line_per_task() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);

        for title in ["one", "two", "three"] {
            log.append(&task("same", title)).unwrap();
        }
        log.append(&task("other", "other")).unwrap();

        let survivors = vec![task("other", "other")];
        log.compact(&survivors).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(log.read_all(), survivors);
    }

    #[test]
    fn append_after_detects_foreign_writes() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(&task("a", "A")).unwrap();

        let seen = log.stamp();
        let own = log.append_after(&task("b", "B"), log.stamp()).unwrap();
        assert!(!own.foreign);
        assert_eq!(own.stamp, log.stamp());
        assert!(log.append_after(&task("c", "C"), seen).unwrap().foreign);
    }

    #[test]
    fn rewrite_keeps_records_it_did_not_load() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(&task("a", "A")).unwrap();
        log.append(&task("other", "written elsewhere")).unwrap();

        let (written, stamp) = log
            .rewrite(|tasks| tasks.into_iter().filter(|task| task.id != "a").collect())
            .unwrap();
        assert_eq!(stamp, log.stamp());
        assert_eq!(written.len(), 1);
        assert_eq!(log.read_all(), written);
        assert_eq!(written[0].id, "other");
    }

    #[test]
    fn stamp_changes_after_append() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(&task("a", "A")).unwrap();
        let first = log.stamp().expect("stamp");
        log.append(&task("b", "B")).unwrap();
        let second = log.stamp().expect("stamp");
        assert!(second.len > first.len);
    }
}
