//! Command-line interface for pilot-tasks
//!
//! This module defines the CLI structure using clap derive macros. Command
//! handlers live in `task`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::Result;
use crate::task::{TaskStatus, TaskType};

mod task;

/// pilot-tasks - dependency-aware task board shared by a human and an agent
#[derive(Parser, Debug)]
#[command(name = "pilot-tasks")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root holding `.pilot/` (defaults to current directory)
    #[arg(long, global = true, env = "PILOT_PROJECT")]
    pub project: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List tasks, optionally filtered
    List(ListArgs),

    /// List tasks that are open with every blocker done
    Ready,

    /// Show one task with its comments
    Show {
        /// Task id
        id: String,
    },

    /// Create a task
    New(NewArgs),

    /// Update fields of a task
    Update(UpdateArgs),

    /// Add a comment to a task
    Comment {
        /// Task id
        id: String,

        /// Comment text
        text: String,

        /// Record the comment as written by the agent
        #[arg(long)]
        agent: bool,
    },

    /// Delete a task and every dependency edge pointing at it
    Delete {
        /// Task id
        id: String,
    },

    /// Print the compact board digest used in agent prompts
    Summary,

    /// Report dangling references, cycles and closedAt mismatches
    Doctor,

    /// Watch the task log and report every change
    Watch {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Status filter (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<TaskStatus>,

    /// Priority filter, 0 (highest) to 4
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=4))]
    pub priority: Vec<u8>,

    /// Type filter: epic, task, bug, feature
    #[arg(long = "type", value_delimiter = ',')]
    pub task_type: Vec<TaskType>,

    /// Match tasks carrying any of these labels
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,

    /// Assignee filter: human, agent, none
    #[arg(long, value_delimiter = ',')]
    pub assignee: Vec<String>,

    /// Only children of this task
    #[arg(long, conflicts_with = "no_parent")]
    pub parent: Option<String>,

    /// Only tasks without a parent
    #[arg(long)]
    pub no_parent: bool,

    /// Case-insensitive search over id, title and description
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct NewArgs {
    /// Task title
    pub title: String,

    /// Longer description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Priority, 0 (highest) to 4
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub priority: Option<u8>,

    /// Type: epic, task, bug, feature
    #[arg(long = "type")]
    pub task_type: Option<TaskType>,

    /// Initial status
    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// Parent task (usually an epic)
    #[arg(long)]
    pub parent: Option<String>,

    /// Tasks that must be done first
    #[arg(long, value_delimiter = ',')]
    pub blocked_by: Vec<String>,

    /// Tasks this one blocks (informational)
    #[arg(long, value_delimiter = ',')]
    pub blocks: Vec<String>,

    /// Related tasks (informational)
    #[arg(long, value_delimiter = ',')]
    pub related: Vec<String>,

    /// Labels
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,

    /// Assignee: human or agent
    #[arg(long)]
    pub assignee: Option<crate::task::Actor>,

    /// Estimate in minutes
    #[arg(long)]
    pub estimate: Option<u32>,

    /// Record the task as created by the agent
    #[arg(long)]
    pub agent: bool,
}

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Task id
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New status
    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// New priority, 0 (highest) to 4
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub priority: Option<u8>,

    /// New type
    #[arg(long = "type")]
    pub task_type: Option<TaskType>,

    /// New parent task
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<String>,

    /// Remove the parent
    #[arg(long)]
    pub clear_parent: bool,

    /// Replace the `blocked_by` edges; other kinds are kept
    #[arg(long, value_delimiter = ',')]
    pub blocked_by: Vec<String>,

    /// Replace the `blocks` edges; other kinds are kept
    #[arg(long, value_delimiter = ',')]
    pub blocks: Vec<String>,

    /// Replace the `related` edges; other kinds are kept
    #[arg(long, value_delimiter = ',')]
    pub related: Vec<String>,

    /// Remove every dependency
    #[arg(long, conflicts_with_all = ["blocked_by", "blocks", "related"])]
    pub clear_deps: bool,

    /// Replace labels
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,

    /// Remove every label
    #[arg(long, conflicts_with = "label")]
    pub clear_labels: bool,

    /// New assignee: human or agent
    #[arg(long, conflicts_with = "clear_assignee")]
    pub assignee: Option<crate::task::Actor>,

    /// Remove the assignee
    #[arg(long)]
    pub clear_assignee: bool,

    /// New estimate in minutes
    #[arg(long, conflicts_with = "clear_estimate")]
    pub estimate: Option<u32>,

    /// Remove the estimate
    #[arg(long)]
    pub clear_estimate: bool,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let watch = matches!(self.command, Commands::Watch { .. });
        let ctx = task::CommandContext::open(self.project, self.json, watch)?;

        match self.command {
            Commands::List(args) => task::run_list(&ctx, args),
            Commands::Ready => task::run_ready(&ctx),
            Commands::Show { id } => task::run_show(&ctx, &id),
            Commands::New(args) => task::run_new(&ctx, args),
            Commands::Update(args) => task::run_update(&ctx, args),
            Commands::Comment { id, text, agent } => task::run_comment(&ctx, &id, &text, agent),
            Commands::Delete { id } => task::run_delete(&ctx, &id),
            Commands::Summary => task::run_summary(&ctx),
            Commands::Doctor => task::run_doctor(&ctx),
            Commands::Watch { duration } => task::run_watch(&ctx, duration),
        }
    }
}
