//! Per-project task boards.
//!
//! `BoardManager` owns one in-memory board per project path. Every mutation
//! writes the log first and applies to memory only after the write succeeded,
//! then notifies change listeners once the board lock has been released.
//! External writes to a loaded board's log are picked up by its watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::{BoardConfig, Config};
use crate::derive::{self, DependencyChain, EpicProgress, TaskFilter};
use crate::error::{Error, Result};
use crate::integrity::{self, IntegrityReport};
use crate::storage::Storage;
use crate::summary;
use crate::task::{self, Actor, Comment, DependencyKind, NewTask, Task, TaskUpdate};
use crate::task_log::{Appended, LogStamp, TaskLog};
use crate::watch::BoardWatcher;

/// Callback invoked with the project path after a board changed.
pub type ChangeListener = Arc<dyn Fn(&Path) + Send + Sync>;

/// Task collection of one project plus its derived sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBoard {
    pub project_path: PathBuf,
    pub tasks: Vec<Task>,
    pub ready_tasks: Vec<Task>,
    pub blocked_tasks: Vec<Task>,
    pub epics: Vec<Task>,
}

impl TaskBoard {
    pub fn new(project_path: impl Into<PathBuf>, tasks: Vec<Task>) -> Self {
        let mut board = Self {
            project_path: project_path.into(),
            tasks,
            ready_tasks: Vec::new(),
            blocked_tasks: Vec::new(),
            epics: Vec::new(),
        };
        board.recompute();
        board
    }

    pub fn recompute(&mut self) {
        let derived = derive::compute_derived(&self.tasks);
        self.ready_tasks = derived.ready;
        self.blocked_tasks = derived.blocked;
        self.epics = derived.epics;
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn replace(&mut self, task: Task) {
        match self.position(&task.id) {
            Some(pos) => self.tasks[pos] = task,
            None => self.tasks.push(task),
        }
    }
}

struct BoardState {
    board: TaskBoard,
    /// Log stamp after the last write or reload this process observed.
    stamp: Option<LogStamp>,
}

impl BoardState {
    /// Adopt our own append. If another writer appended since we last looked,
    /// re-read the log so their records reach memory.
    fn record_append(&mut self, log: &TaskLog, appended: Appended) {
        if appended.foreign {
            tracing::debug!(
                project = %self.board.project_path.display(),
                "task log changed by another writer, re-reading"
            );
            self.board.tasks = log.read_all();
        }
        self.board.recompute();
        self.stamp = appended.stamp;
    }

    /// Re-read the log. Unless forced, skips when the log still carries the
    /// stamp of our own last write.
    fn reload(&mut self, log: &TaskLog, force: bool) -> bool {
        let stamp = log.stamp();
        if !force && stamp == self.stamp {
            tracing::debug!(
                project = %self.board.project_path.display(),
                "log unchanged since last write, skipping reload"
            );
            return false;
        }
        self.board.tasks = log.read_all();
        self.board.recompute();
        self.stamp = stamp;
        tracing::debug!(
            project = %self.board.project_path.display(),
            tasks = self.board.tasks.len(),
            "board reloaded"
        );
        true
    }
}

#[derive(Default)]
struct Listeners {
    inner: RwLock<Vec<ChangeListener>>,
}

impl Listeners {
    fn notify(&self, project: &Path) {
        let listeners: Vec<ChangeListener> = self.inner.read().clone();
        for listener in listeners {
            listener(project);
        }
    }
}

struct BoardEntry {
    state: Arc<Mutex<BoardState>>,
    log: TaskLog,
    watcher: Option<BoardWatcher>,
}

/// Registry of loaded boards, keyed by project path.
pub struct BoardManager {
    config: BoardConfig,
    boards: Mutex<HashMap<PathBuf, BoardEntry>>,
    listeners: Arc<Listeners>,
}

impl Default for BoardManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl BoardManager {
    pub fn new(config: Config) -> Self {
        Self {
            config: config.board,
            boards: Mutex::new(HashMap::new()),
            listeners: Arc::new(Listeners::default()),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Register a change listener. Listeners run after the board lock is
    /// released, on the calling thread or the board's watch thread.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.listeners.inner.write().push(Arc::new(listener));
    }

    /// Load a board, or return the cached one. A missing or unreadable log is
    /// an empty board.
    pub fn load_board(&self, project: &Path) -> TaskBoard {
        let (state, _) = self.open(project);
        let board = state.lock().board.clone();
        board
    }

    pub fn is_loaded(&self, project: &Path) -> bool {
        self.boards.lock().contains_key(project)
    }

    pub fn loaded_projects(&self) -> Vec<PathBuf> {
        let mut projects: Vec<PathBuf> = self.boards.lock().keys().cloned().collect();
        projects.sort();
        projects
    }

    fn open(&self, project: &Path) -> (Arc<Mutex<BoardState>>, TaskLog) {
        let mut boards = self.boards.lock();
        if let Some(entry) = boards.get(project) {
            return (Arc::clone(&entry.state), entry.log.clone());
        }

        let storage = Storage::new(project);
        let log = TaskLog::new(storage.clone(), self.config.lock_timeout_ms);
        let state = Arc::new(Mutex::new(BoardState {
            board: TaskBoard::new(project, log.read_all()),
            stamp: log.stamp(),
        }));

        let watcher = if self.config.watch {
            self.start_watcher(project, &storage, &log, &state)
        } else {
            None
        };

        tracing::debug!(project = %project.display(), "board loaded");
        boards.insert(
            project.to_path_buf(),
            BoardEntry {
                state: Arc::clone(&state),
                log: log.clone(),
                watcher,
            },
        );
        (state, log)
    }

    fn start_watcher(
        &self,
        project: &Path,
        storage: &Storage,
        log: &TaskLog,
        state: &Arc<Mutex<BoardState>>,
    ) -> Option<BoardWatcher> {
        if let Err(err) = storage.ensure_tasks_dir() {
            tracing::warn!(
                project = %project.display(),
                error = %err,
                "cannot create tasks directory, board will not be watched"
            );
            return None;
        }

        let project_path = project.to_path_buf();
        let watched_log = log.clone();
        let watched_state = Arc::clone(state);
        let listeners = Arc::clone(&self.listeners);
        let on_change = move || {
            let changed = watched_state.lock().reload(&watched_log, false);
            if changed {
                listeners.notify(&project_path);
            }
        };

        match BoardWatcher::spawn(&log.path(), self.config.debounce(), on_change) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                tracing::warn!(
                    project = %project.display(),
                    error = %err,
                    "failed to watch task log"
                );
                None
            }
        }
    }

    pub fn create_task(&self, project: &Path, input: NewTask) -> Result<Task> {
        let (state, log) = self.open(project);
        let created = {
            let mut state = state.lock();
            let task = Task::create(
                task::generate_task_id(&self.config.id_prefix),
                input,
                task::now(),
            )?;
            if task.has_blocked_by() {
                derive::validate_no_cycles(&state.board.tasks, &task)?;
            }
            let appended = log.append_after(&task, state.stamp)?;
            state.board.tasks.push(task.clone());
            state.record_append(&log, appended);
            task
        };

        tracing::debug!(project = %project.display(), id = %created.id, "task created");
        self.listeners.notify(project);
        Ok(created)
    }

    /// Apply a partial update. When the task belongs to an epic whose children
    /// are now all done, the epic is closed in the same call.
    pub fn update_task(&self, project: &Path, id: &str, update: TaskUpdate) -> Result<Task> {
        let (state, log) = self.open(project);
        let revalidate = update
            .dependencies
            .as_ref()
            .is_some_and(|deps| deps.iter().any(|dep| dep.kind == DependencyKind::BlockedBy));

        let (updated, epic_result) = {
            let mut state = state.lock();
            let now = task::now();
            let pos = state
                .board
                .position(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            let mut candidate = state.board.tasks[pos].clone();
            candidate.apply_update(update, now)?;
            if revalidate {
                let mut tasks = state.board.tasks.clone();
                tasks[pos] = candidate.clone();
                derive::validate_no_cycles(&tasks, &candidate)?;
            }

            let appended = log.append_after(&candidate, state.stamp)?;
            state.board.tasks[pos] = candidate.clone();
            state.record_append(&log, appended);

            let epic_result = match candidate.parent_id.as_deref() {
                Some(parent_id) => {
                    match derive::check_epic_auto_completion(&state.board.tasks, parent_id, now) {
                        Some(epic) => log.append_after(&epic, state.stamp).map(|appended| {
                            tracing::debug!(
                                project = %project.display(),
                                epic = %epic.id,
                                "epic auto-completed"
                            );
                            state.board.replace(epic);
                            state.record_append(&log, appended);
                        }),
                        None => Ok(()),
                    }
                }
                None => Ok(()),
            };
            (candidate, epic_result)
        };

        // The child update is durable even if closing its epic failed.
        self.listeners.notify(project);
        epic_result?;
        Ok(updated)
    }

    pub fn add_comment(
        &self,
        project: &Path,
        id: &str,
        text: &str,
        author: Actor,
    ) -> Result<Comment> {
        let (state, log) = self.open(project);
        let comment = {
            let mut state = state.lock();
            let pos = state
                .board
                .position(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            let mut candidate = state.board.tasks[pos].clone();
            let comment = candidate.push_comment(text, author, task::now())?;
            let appended = log.append_after(&candidate, state.stamp)?;
            state.board.tasks[pos] = candidate;
            state.record_append(&log, appended);
            comment
        };

        self.listeners.notify(project);
        Ok(comment)
    }

    /// Remove a task and every dependency edge pointing at it. Returns
    /// `false` for unknown ids without touching the log. The log is replayed
    /// under its lock before compacting, so records other writers appended
    /// since our last reload survive.
    pub fn delete_task(&self, project: &Path, id: &str) -> Result<bool> {
        let (state, log) = self.open(project);
        {
            let mut state = state.lock();
            if state.board.position(id).is_none() {
                return Ok(false);
            }

            let now = task::now();
            let (remaining, stamp) = log.rewrite(|tasks| {
                tasks
                    .into_iter()
                    .filter(|task| task.id != id)
                    .map(|mut task| {
                        if task.remove_dependencies_on(id) {
                            task.updated_at = now;
                        }
                        task
                    })
                    .collect()
            })?;
            state.board.tasks = remaining;
            state.board.recompute();
            state.stamp = stamp;
        }

        tracing::debug!(project = %project.display(), id, "task deleted");
        self.listeners.notify(project);
        Ok(true)
    }

    pub fn get_task(&self, project: &Path, id: &str) -> Option<Task> {
        self.read(project, |board| board.get(id).cloned())
    }

    pub fn query_tasks(&self, project: &Path, filter: &TaskFilter) -> Vec<Task> {
        self.read(project, |board| derive::filter_tasks(&board.tasks, filter))
    }

    pub fn ready_tasks(&self, project: &Path) -> Vec<Task> {
        self.read(project, |board| board.ready_tasks.clone())
    }

    pub fn dependency_chain(&self, project: &Path, id: &str) -> DependencyChain {
        self.read(project, |board| derive::dependency_chain(&board.tasks, id))
    }

    pub fn epic_progress(&self, project: &Path, epic_id: &str) -> EpicProgress {
        self.read(project, |board| derive::epic_progress(&board.tasks, epic_id))
    }

    pub fn agent_summary(&self, project: &Path) -> String {
        self.read(project, summary::format_agent_summary)
    }

    pub fn check_integrity(&self, project: &Path) -> IntegrityReport {
        self.read(project, |board| integrity::check_integrity(&board.tasks))
    }

    /// Re-read the log unconditionally and notify listeners.
    pub fn reload(&self, project: &Path) -> TaskBoard {
        let (state, log) = self.open(project);
        let board = {
            let mut state = state.lock();
            state.reload(&log, true);
            state.board.clone()
        };
        self.listeners.notify(project);
        board
    }

    /// Stop watching and forget one project, or every project when `None`.
    /// Pending reloads are dropped.
    pub fn dispose(&self, project: Option<&Path>) {
        let removed: Vec<(PathBuf, BoardEntry)> = {
            let mut boards = self.boards.lock();
            match project {
                Some(project) => boards.remove_entry(project).into_iter().collect(),
                None => boards.drain().collect(),
            }
        };

        for (project, entry) in removed {
            if let Some(watcher) = entry.watcher {
                watcher.stop();
            }
            tracing::debug!(project = %project.display(), "board disposed");
        }
    }

    fn read<T>(&self, project: &Path, f: impl FnOnce(&TaskBoard) -> T) -> T {
        let (state, _) = self.open(project);
        let state = state.lock();
        f(&state.board)
    }
}

impl Drop for BoardManager {
    fn drop(&mut self) {
        self.dispose(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Dependency, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn manager() -> BoardManager {
        let mut config = Config::default();
        config.board.watch = false;
        BoardManager::new(config)
    }

    fn counter(manager: &BoardManager) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        manager.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn failed_write_leaves_board_untouched() {
        let temp = TempDir::new().unwrap();
        let manager = manager();
        let project = temp.path();
        let task = manager.create_task(project, NewTask::new("A")).unwrap();

        // Occupy the log path with a directory so the next append fails.
        let log_path = Storage::new(project).tasks_log();
        std::fs::remove_file(&log_path).unwrap();
        std::fs::create_dir(&log_path).unwrap();

        let count = counter(&manager);
        let err = manager
            .update_task(project, &task.id, TaskUpdate::status(TaskStatus::Done))
            .unwrap_err();
        assert!(err.is_storage());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let board = manager.load_board(project);
        assert_eq!(board.tasks[0].status, TaskStatus::Open);
        assert_eq!(board.ready_tasks.len(), 1);
    }

    #[test]
    fn rejected_cycle_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let manager = manager();
        let project = temp.path();
        let a = manager.create_task(project, NewTask::new("A")).unwrap();
        let b = manager
            .create_task(
                project,
                NewTask {
                    dependencies: vec![Dependency::blocked_by(&a.id)],
                    ..NewTask::new("B")
                },
            )
            .unwrap();

        let before = std::fs::read_to_string(Storage::new(project).tasks_log()).unwrap();
        let update = TaskUpdate {
            dependencies: Some(vec![Dependency::blocked_by(&b.id)]),
            ..TaskUpdate::default()
        };
        let err = manager.update_task(project, &a.id, update).unwrap_err();
        assert!(matches!(
            err,
            Error::CircularDependency { ref task_id, ref blocker_id }
                if *task_id == a.id && *blocker_id == b.id
        ));
        let after = std::fs::read_to_string(Storage::new(project).tasks_log()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn own_write_does_not_trigger_reload() {
        let temp = TempDir::new().unwrap();
        let manager = manager();
        let project = temp.path();
        manager.create_task(project, NewTask::new("A")).unwrap();

        let (state, log) = manager.open(project);
        assert!(!state.lock().reload(&log, false));
        assert!(state.lock().reload(&log, true));
    }

    #[test]
    fn dispose_forgets_boards() {
        let temp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let manager = manager();
        manager.load_board(temp.path());
        manager.load_board(other.path());
        assert_eq!(manager.loaded_projects().len(), 2);

        manager.dispose(Some(temp.path()));
        assert!(!manager.is_loaded(temp.path()));
        assert!(manager.is_loaded(other.path()));

        manager.dispose(None);
        manager.dispose(None);
        assert!(manager.loaded_projects().is_empty());
    }
}
