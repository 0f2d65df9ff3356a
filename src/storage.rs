//! Storage layer for pilot-tasks
//!
//! Manages persistent task board state under the project root.
//!
//! # Directory Structure
//!
//! ```text
//! <project>/.pilot/
//!   tasks.toml                  # Optional board configuration
//!   tasks/
//!     tasks.jsonl               # Append-only task log (one record per line)
//!     tasks.lock                # Cross-process lock for log writes
//! ```

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock;

/// Name of the per-project state directory
pub const PILOT_DIR: &str = ".pilot";

/// Name of the tasks directory within `.pilot/`
pub const TASKS_DIR: &str = "tasks";

/// File name of the task log
pub const TASKS_LOG: &str = "tasks.jsonl";

/// File name of the task log lock
pub const TASKS_LOCK: &str = "tasks.lock";

/// File name of the board configuration within `.pilot/`
pub const CONFIG_FILE: &str = "tasks.toml";

/// Storage manager for one project's task board
#[derive(Debug, Clone)]
pub struct Storage {
    /// Path to the project root
    project_root: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at the given project path
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Path to the project root directory
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Path to the `.pilot/` directory
    pub fn pilot_dir(&self) -> PathBuf {
        self.project_root.join(PILOT_DIR)
    }

    /// Path to the `.pilot/tasks/` directory
    pub fn tasks_dir(&self) -> PathBuf {
        self.pilot_dir().join(TASKS_DIR)
    }

    /// Path to the task log (JSONL format)
    pub fn tasks_log(&self) -> PathBuf {
        self.tasks_dir().join(TASKS_LOG)
    }

    /// Path to the lock file guarding the task log
    pub fn tasks_lock(&self) -> PathBuf {
        self.tasks_dir().join(TASKS_LOCK)
    }

    /// Path to the board configuration file
    pub fn config_file(&self) -> PathBuf {
        self.pilot_dir().join(CONFIG_FILE)
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create `.pilot/tasks/` and any missing parents
    pub fn ensure_tasks_dir(&self) -> Result<()> {
        fs::create_dir_all(self.tasks_dir())?;
        Ok(())
    }

    // =========================================================================
    // JSONL helpers
    // =========================================================================

    /// Append a line to a JSONL file
    ///
    /// Note: This is NOT atomic across processes. Callers hold the log lock.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        // A hand-edited log may lack a final newline; keep records on their own line
        let needs_separator = file.metadata()?.len() > 0 && !ends_with_newline(path)?;
        let mut line = String::with_capacity(json.len() + 2);
        if needs_separator {
            line.push('\n');
        }
        line.push_str(&json);
        line.push('\n');

        file.write_all(line.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    /// Read all parseable records from a JSONL file
    ///
    /// Blank lines are ignored and malformed lines are skipped with a warning.
    /// A missing file reads as empty.
    pub fn read_jsonl_lenient<T: DeserializeOwned>(&self, path: &Path) -> io::Result<Vec<T>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        "skipping non UTF-8 record"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %err,
                        "skipping malformed record"
                    );
                }
            }
        }

        Ok(records)
    }

    /// Replace a JSONL file with exactly the given records, atomically
    pub fn write_jsonl_atomic<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let mut buffer = Vec::new();
        for record in records {
            let json = serde_json::to_string(record)?;
            buffer.extend_from_slice(json.as_bytes());
            buffer.push(b'\n');
        }
        lock::write_atomic(path, &buffer)
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
