//! Cross-process mutual exclusion over a worktree base directory.
//!
//! Identity assignment (scan → next id → worktree add → metadata write) must
//! observe a consistent base directory, so it runs under an exclusive fs2
//! lock on `<base>/.lock`. The OS releases the lock when the holding process
//! dies, so a crashed holder never deadlocks future acquirers.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tokio_util::sync::CancellationToken;

/// Lock file name inside the base directory. Content is irrelevant.
pub const LOCK_FILE: &str = ".lock";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "timed out after {waited:?} waiting for {path} — another invocation may be stuck holding it"
    )]
    Timeout { path: PathBuf, waited: Duration },
    #[error("lock acquisition interrupted")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An exclusive hold on a base directory. Released explicitly via
/// [`BaseDirLock::release`] or implicitly on drop.
pub struct BaseDirLock {
    file: Option<File>,
}

impl BaseDirLock {
    /// Acquire the lock, polling until `timeout` elapses. Not re-entrant:
    /// a second acquire in the same process blocks like any other contender.
    pub async fn acquire(
        path: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file: Some(file) }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            tokio::select! {
                () = tokio::time::sleep(POLL_INTERVAL) => {}
                () = cancel.cancelled() => return Err(LockError::Interrupted),
            }
        }
    }

    /// Release the lock. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

impl Drop for BaseDirLock {
    fn drop(&mut self) {
        self.release();
    }
}
