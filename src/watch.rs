//! File watcher for a board's task log.
//!
//! Watches the log's directory (non-recursively) and collapses bursts of
//! changes into a single reload: each relevant event pushes one pending
//! deadline out by the debounce interval, and the reload runs once the
//! deadline passes without further events.

use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{Error, Result};

enum WatchMsg {
    Fs(notify::Result<notify::Event>),
    Stop,
}

/// Handle to a running watcher. Dropping it stops the watch thread.
pub struct BoardWatcher {
    control: Sender<WatchMsg>,
    handle: Option<JoinHandle<()>>,
    _watcher: RecommendedWatcher,
}

impl BoardWatcher {
    /// Start watching `log_path`, calling `on_change` after each debounced
    /// burst of changes to that file. The log's directory must exist.
    pub fn spawn<F>(log_path: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (dir, file_name) = match (log_path.parent(), log_path.file_name()) {
            (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_os_string()),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "cannot watch {}",
                    log_path.display()
                )))
            }
        };

        let (control, events) = mpsc::channel();
        let event_tx = control.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(WatchMsg::Fs(res));
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let handle = thread::Builder::new()
            .name("pilot-tasks-watch".to_string())
            .spawn(move || run_debounce_loop(events, file_name, debounce, on_change))?;

        tracing::info!(path = %log_path.display(), "watching task log");

        Ok(Self {
            control,
            handle: Some(handle),
            _watcher: watcher,
        })
    }

    /// Stop the watch thread and drop any pending reload.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.control.send(WatchMsg::Stop);
        if let Some(handle) = self.handle.take() {
            // A change listener may dispose its own board from the watch thread
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for BoardWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn is_relevant(event: &notify::Event, file_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

fn run_debounce_loop<F>(
    events: Receiver<WatchMsg>,
    file_name: OsString,
    debounce: Duration,
    mut on_change: F,
) where
    F: FnMut(),
{
    let mut pending: Option<Instant> = None;

    loop {
        let msg = match pending {
            Some(deadline) => {
                events.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(WatchMsg::Fs(Ok(event))) => {
                if is_relevant(&event, &file_name) {
                    pending = Some(Instant::now() + debounce);
                }
            }
            Ok(WatchMsg::Fs(Err(err))) => {
                tracing::warn!(error = %err, "task log watch error");
            }
            Err(RecvTimeoutError::Timeout) => {
                pending = None;
                on_change();
            }
            Ok(WatchMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
