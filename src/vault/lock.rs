//! Advisory locking for vault files.
//!
//! Readers take a shared lock and writers an exclusive one, on a sidecar
//! `<vault>.lock` file next to the vault. The lock file is never
//! renamed or replaced, so it stays valid while `init --force` swaps
//! the vault itself. Acquisition polls a non-blocking file lock (`flock`
//! on unix, `LockFileEx` on Windows) until the configured timeout, then
//! fails with `VaultBusy`.

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::{Result, VaultError};

/// Delay between two lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A held lock. Released when dropped.
#[derive(Debug)]
pub struct VaultLock {
    file: File,
    mode: LockMode,
}

impl VaultLock {
    /// Path of the sidecar lock file for `vault_path`.
    pub fn lock_path(vault_path: &Path) -> PathBuf {
        let mut name = vault_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        vault_path.with_file_name(name)
    }

    /// Acquire a lock on `vault_path`, waiting at most `timeout`.
    pub fn acquire(vault_path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let lock_path = Self::lock_path(vault_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            if try_lock(&file, mode)? {
                tracing::trace!(path = %lock_path.display(), ?mode, "lock acquired");
                return Ok(Self { file, mode });
            }

            let waited = started.elapsed();
            if waited >= timeout {
                tracing::debug!(path = %lock_path.display(), ?mode, ?waited, "lock timed out");
                return Err(VaultError::VaultBusy {
                    path: vault_path.to_path_buf(),
                    waited,
                });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well.
        if let Err(e) = self.file.unlock() {
            tracing::debug!(error = %e, "explicit unlock failed");
        }
    }
}

/// One non-blocking attempt. `Ok(false)` means somebody else holds it.
fn try_lock(file: &File, mode: LockMode) -> Result<bool> {
    let attempt = match mode {
        LockMode::Shared => file.try_lock_shared(),
        LockMode::Exclusive => file.try_lock(),
    };
    match attempt {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(e)) if e.kind() == io::ErrorKind::Unsupported => {
            UNSUPPORTED.call_once(|| {
                tracing::warn!("file locking is not supported on this platform; concurrent writers are not serialized");
            });
            Ok(true)
        }
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

static UNSUPPORTED: Once = Once::new();
