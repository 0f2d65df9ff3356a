#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pilot_tasks::config::Config;
use pilot_tasks::task::Task;
use pilot_tasks::BoardManager;
use tempfile::TempDir;

pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.dir.path().join(".pilot").join("tasks")
    }

    pub fn log_path(&self) -> PathBuf {
        self.tasks_dir().join("tasks.jsonl")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".pilot/tasks.toml", contents)
    }

    pub fn write_log(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".pilot/tasks/tasks.jsonl", contents)
    }

    pub fn read_log(&self) -> String {
        fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    pub fn log_records(&self) -> Vec<Task> {
        self.read_log()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("log line parses"))
            .collect()
    }

    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("pilot-tasks").expect("binary");
        cmd.arg("--project").arg(self.path()).env_remove("PILOT_PROJECT");
        cmd
    }
}

/// Manager without file watching, so tests control every reload.
pub fn unwatched_manager() -> BoardManager {
    let mut config = Config::default();
    config.board.watch = false;
    BoardManager::new(config)
}

pub fn watched_manager(debounce_ms: u64) -> BoardManager {
    let mut config = Config::default();
    config.board.watch = true;
    config.board.debounce_ms = debounce_ms;
    BoardManager::new(config)
}

/// A full task record as an external writer would append it.
pub fn record(id: &str, title: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "description": "",
        "status": status,
        "priority": 2,
        "type": "task",
        "dependencies": [],
        "labels": [],
        "assignee": null,
        "estimateMinutes": null,
        "createdAt": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:00:00.000Z",
        "closedAt": null,
        "createdBy": "human",
        "comments": []
    })
}

pub fn lines(records: &[serde_json::Value]) -> String {
    records
        .iter()
        .map(|record| format!("{record}\n"))
        .collect()
}
