//! Locking and atomic writes for tagsync
//!
//! This module provides the concurrency primitives the store relies on:
//! - File locking (fs2/flock) around every store snapshot read-modify-write
//! - Atomic write pattern (write temp + rename)
//! - Lock timeout with configurable wait
//! - Per-task in-process locks for serialized reconciliation

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 25;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// The lock file is created if missing. Returns `Error::LockFailed`
    /// if the lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Try to acquire a lock without waiting
    ///
    /// Returns `Ok(Some(lock))` if acquired, `Ok(None)` if would block.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Atomically write data to a file
///
/// Writes to a temporary sibling file, then renames it over the target.
/// Does NOT acquire a lock; callers coordinate through `FileLock`.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));

    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// In-process locks keyed by task uuid.
///
/// Reconciliation reads the live links of a task, diffs, then writes row by
/// row. Two interleaved reconciliations of the same task would both see the
/// same missing tag, so callers hold the task's guard for the whole pass.
/// The locks cover one `TaskLocks` value only; two instances do not see
/// each other. A slot lives only while some guard for its task exists.
#[derive(Debug, Default)]
pub struct TaskLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard returned by `TaskLocks::lock`; its slot is released on drop.
pub struct TaskGuard<'a> {
    locks: &'a TaskLocks,
    task_uuid: String,
    slot: Arc<Mutex<()>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard for `task_uuid`; `TaskGuard::hold` does the blocking.
    pub fn lock(&self, task_uuid: &str) -> TaskGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(slots.entry(task_uuid.to_string()).or_default())
        };
        TaskGuard {
            locks: self,
            task_uuid: task_uuid.to_string(),
            slot,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots().len()
    }
}

impl TaskGuard<'_> {
    /// Run `f` while holding the task lock.
    pub fn hold<T>(&self, f: impl FnOnce() -> T) -> T {
        let _held = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        // Clones are only taken under the map lock, so the count is stable.
        // The map and this guard account for two references.
        if Arc::strong_count(&self.slot) == 2 {
            let ours = slots
                .get(&self.task_uuid)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot));
            if ours {
                slots.remove(&self.task_uuid);
            }
        }
    }
}
