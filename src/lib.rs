//! pilot-tasks - task board engine
//!
//! A persistent, dependency-aware task board shared by a human and an agent.
//! Each project keeps its board in `.pilot/tasks/tasks.jsonl`, an append-only
//! log replayed with last-write-wins by task id.
//!
//! # Core Concepts
//!
//! - **Tasks**: records with status, priority, type, parent and typed
//!   dependency edges; only `blocked_by` edges affect readiness
//! - **Derived state**: ready, blocked and epic sets recomputed after every
//!   change, never persisted
//! - **Board manager**: one cached board per project, kept in sync with the
//!   log by a debounced file watcher
//! - **Agent summary**: a compact `<tasks>` digest for prompts
//!
//! # Module Organization
//!
//! - `board`: board registry and mutation ordering
//! - `cli`: command-line interface using clap
//! - `config`: configuration loading from `.pilot/tasks.toml`
//! - `derive`: pure derived-state functions
//! - `error`: error types and result aliases
//! - `integrity`: report of dangling references and cycles
//! - `lock`: file locking and atomic writes
//! - `storage`: project layout and JSONL I/O
//! - `summary`: agent digest formatter
//! - `task`: task record model
//! - `task_log`: append-only log with replay and compaction
//! - `watch`: debounced log watcher

pub mod board;
pub mod cli;
pub mod config;
pub mod derive;
pub mod error;
pub mod integrity;
pub mod lock;
pub mod storage;
pub mod summary;
pub mod task;
pub mod task_log;
pub mod watch;

pub use board::{BoardManager, TaskBoard};
pub use error::{Error, Result};
