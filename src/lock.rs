//! Cross-process locking and atomic replacement of the task log.
//!
//! Appends and compactions both run under an exclusive fs2 lock on
//! `tasks.lock`, a sibling of the log that is never itself read. Compaction
//! writes a temp file next to the log and renames it into place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

const LOCK_POLL: Duration = Duration::from_millis(20);

/// Exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Poll for the lock until `timeout_ms` elapses, creating the lock file
    /// and its directory if needed.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if contended(&err) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(lock = %path.display(), "timed out waiting for task log lock");
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn contended(err: &io::Error) -> bool {
    // Windows reports sharing (32) and lock (33) violations instead of WouldBlock
    err.kind() == io::ErrorKind::WouldBlock
        || (cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)))
}

/// Replace `path` with `data` in one rename. Readers see either the old or
/// the new contents, never a mix. Does not lock.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| -> io::Result<()> {
        let mut temp = File::create(&temp_path)?;
        temp.write_all(data)?;
        temp.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}
