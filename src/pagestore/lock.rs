//! Advisory file locks with a bounded wait
//!
//! Readers take a shared lock, the writer an exclusive one. The lock is
//! polled until the open timeout elapses; it is released when the guard drops.

use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::errors::{StoreError, StoreResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holds a lock on a cloned file handle until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquires `mode` on `file`, waiting at most `timeout`.
    ///
    /// A zero timeout waits indefinitely.
    pub fn acquire(file: &File, path: &Path, mode: LockMode, timeout: Duration) -> StoreResult<Self> {
        let file = file
            .try_clone()
            .map_err(|e| StoreError::io_error("Failed to clone file handle for locking", e))?;
        let started = Instant::now();

        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if !timeout.is_zero() && started.elapsed() >= timeout {
                        return Err(StoreError::open_timeout(path, timeout));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(StoreError::io_error(
                        format!("Failed to lock {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release file lock");
        }
    }
}
