//! pilot-tasks - task board CLI
//!
//! Drives the task board engine from the command line: create, update and
//! query tasks, print the agent digest, check board integrity and watch the
//! log for changes.

use clap::Parser;
use pilot_tasks::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    // Tracing is opt-in via RUST_LOG and goes to stderr.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = Cli::parse().run() {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
