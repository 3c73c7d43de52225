//! Advisory lock scoped to an Account Store directory.
//!
//! Built on `fs2` file locks, so it coordinates every process on the machine
//! that points at the same base directory. Acquisition polls with a bounded
//! wait instead of blocking indefinitely.

use crate::error::{Result, RotationError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

/// Interval between lock attempts while another holder owns the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Acquires the lock file at `path`, waiting up to `timeout`.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RotationError::storage("Failed to create store directory", e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| RotationError::storage("Failed to open lock file", e))?;

        let deadline = Instant::now() + timeout;
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        tracing::warn!("Timed out waiting {:?} for rotation lock", timeout);
                        return Err(RotationError::LockTimeout(timeout));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(RotationError::storage("Failed to acquire lock", e)),
            }
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
