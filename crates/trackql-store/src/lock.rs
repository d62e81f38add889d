//! Advisory per-unit lock files for the filesystem store.
//!
//! A lock is a sibling `<unit>.lock` file created with `create_new`; holding
//! the guard holds the lock and dropping it removes the file. Contention is
//! retried with bounded exponential backoff before surfacing as
//! `StoreError::Unavailable`.

use crate::error::StoreError;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

pub fn lock_path(unit_path: &Path) -> PathBuf {
    let mut path: OsString = unit_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

/// Retry budget for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Attempts after the first.
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl LockPolicy {
    pub fn new(retries: u32, initial_backoff_ms: u64) -> Self {
        Self {
            retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

enum TryLock {
    Acquired(UnitLockGuard),
    Busy,
}

#[derive(Debug)]
pub struct UnitLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl UnitLockGuard {
    /// Acquire the lock guarding `unit_path`, retrying on contention.
    ///
    /// `name` identifies the unit in errors and logs. Cancellation is checked
    /// before every attempt.
    pub fn acquire(
        unit_path: &Path,
        name: &str,
        policy: LockPolicy,
        cancel: &CancellationToken,
    ) -> Result<Self, StoreError> {
        let lock_path = lock_path(unit_path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
        }

        let attempts = policy.retries.saturating_add(1);
        for attempt in 0..attempts {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            match Self::try_acquire(&lock_path)? {
                TryLock::Acquired(guard) => return Ok(guard),
                TryLock::Busy if attempt + 1 < attempts => {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        unit = name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "lock busy, retrying"
                    );
                    std::thread::sleep(delay);
                }
                TryLock::Busy => {}
            }
        }

        Err(StoreError::Unavailable {
            key: name.to_string(),
            attempts,
        })
    }

    fn try_acquire(lock_path: &Path) -> Result<TryLock, StoreError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(TryLock::Acquired(Self {
                    lock_path: lock_path.to_path_buf(),
                    _file: file,
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(TryLock::Busy),
            Err(err) => Err(StoreError::Io(format!(
                "failed to acquire lock {}: {err}",
                lock_path.display()
            ))),
        }
    }
}

impl Drop for UnitLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LockPolicy {
        LockPolicy::new(2, 1)
    }

    #[test]
    fn guard_removes_lock_file_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let unit = dir.path().join("DEV-1.json");
        let guard = UnitLockGuard::acquire(&unit, "DEV-1", policy(), &CancellationToken::new())
            .expect("lock should acquire");
        assert!(lock_path(&unit).exists());
        drop(guard);
        assert!(!lock_path(&unit).exists());
    }

    #[test]
    fn contention_exhausts_retries_as_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let unit = dir.path().join("DEV-1.json");
        let _held = UnitLockGuard::acquire(&unit, "DEV-1", policy(), &CancellationToken::new())
            .expect("lock should acquire");

        match UnitLockGuard::acquire(&unit, "DEV-1", policy(), &CancellationToken::new()) {
            Err(StoreError::Unavailable { key, attempts }) => {
                assert_eq!(key, "DEV-1");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_wins_over_waiting() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let unit = dir.path().join("DEV-1.json");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            UnitLockGuard::acquire(&unit, "DEV-1", policy(), &cancel),
            Err(StoreError::Cancelled)
        ));
        assert!(!lock_path(&unit).exists());
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let policy = LockPolicy::new(40, 5);
        assert_eq!(policy.backoff(0), Duration::from_millis(5));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(35), MAX_BACKOFF);
    }
}
