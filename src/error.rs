//! Error types for pilot-tasks
//!
//! Exit codes for the CLI host:
//! - 0: Success
//! - 2: User error (bad args, invalid config)
//! - 3: Rejected by the board (circular dependency, unknown task)
//! - 4: Operation failed (storage, lock, watcher)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the pilot-tasks CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for task board operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Board rejections (exit code 3)
    #[error("Circular dependency: {task_id} cannot be blocked by {blocker_id}")]
    CircularDependency { task_id: String, blocker_id: String },

    #[error("Task not found: {0}")]
    NotFound(String),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_) | Error::InvalidArgument(_) => exit_codes::USER_ERROR,

            Error::CircularDependency { .. } | Error::NotFound(_) => exit_codes::REJECTED,

            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::Watch(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// True for failures reading or writing the backing log.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Json(_) | Error::LockFailed(_))
    }
}

/// Result type alias for task board operations
pub type Result<T> = std::result::Result<T, Error>;
