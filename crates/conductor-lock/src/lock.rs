//! Advisory file lock with bounded waiting.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::holder::{HolderRecord, LockStatus};
use crate::{LockError, LockResult};

/// How long `acquire` sleeps between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive lock over one shared resource, identified by a lock file path.
#[derive(Debug, Clone)]
pub struct WorkspaceLock {
    path: PathBuf,
    retry_interval: Duration,
}

/// A held workspace lock.
///
/// The lock is released when the guard is dropped, on every exit path.
pub struct WorkspaceLockGuard {
    file: File,
    path: PathBuf,
    holder: HolderRecord,
    acquired: Instant,
}

impl WorkspaceLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the delay between acquisition attempts.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock for `owner`, waiting up to `timeout`.
    ///
    /// Retries at short intervals while another holder has the lock and
    /// fails with [`LockError::Timeout`] once `timeout` has elapsed.
    pub async fn acquire(&self, owner: &str, timeout: Duration) -> LockResult<WorkspaceLockGuard> {
        let started = Instant::now();
        info!(owner, ?timeout, path = %self.path.display(), "Attempting to acquire workspace lock");

        loop {
            if let Some(guard) = self.try_acquire(owner)? {
                info!(
                    owner,
                    wait_ms = started.elapsed().as_millis() as u64,
                    "Workspace lock acquired"
                );
                return Ok(guard);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                error!(owner, ?timeout, ?waited, "Failed to acquire workspace lock within timeout");
                return Err(LockError::Timeout {
                    owner: owner.to_string(),
                    waited,
                });
            }

            let remaining = timeout - waited;
            tokio::time::sleep(self.retry_interval.min(remaining)).await;
        }
    }

    /// Try to acquire the lock without waiting.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(&self, owner: &str) -> LockResult<Option<WorkspaceLockGuard>> {
        let file = self.open()?;

        // fs2's trait method, not the inherent File::try_lock_exclusive of newer std.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(owner, "Workspace lock is held by another owner");
                return Ok(None);
            }
            Err(e) => return Err(LockError::Io(e)),
        }

        let holder = HolderRecord::current(owner);
        if let Err(e) = write_holder(&file, &holder) {
            let _ = FileExt::unlock(&file);
            return Err(LockError::Io(e));
        }

        Ok(Some(WorkspaceLockGuard {
            file,
            path: self.path.clone(),
            holder,
            acquired: Instant::now(),
        }))
    }

    /// Report whether the lock is held, by whom and since when.
    pub fn status(&self) -> LockResult<LockStatus> {
        if !self.path.exists() {
            return Ok(LockStatus::free());
        }

        let file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockStatus::free()),
            Err(source) => {
                return Err(LockError::Open {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                FileExt::unlock(&file)?;
                Ok(LockStatus::free())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let content = fs::read_to_string(&self.path).unwrap_or_default();
                Ok(LockStatus {
                    locked: true,
                    holder: HolderRecord::parse(&content),
                })
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Remove the lock file regardless of who holds it.
    ///
    /// Operator escape hatch only: the current holder keeps its lock on the
    /// unlinked file while new contenders lock a fresh one, so mutual
    /// exclusion is lost until the old holder finishes.
    pub fn force_release(&self, requested_by: &str) -> LockResult<bool> {
        let previous = self.status().ok().and_then(|s| s.holder);
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(
                    requested_by,
                    previous_owner = previous.as_ref().map(|h| h.owner.as_str()),
                    path = %self.path.display(),
                    "Workspace lock forcefully removed"
                );
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(requested_by, "No workspace lock file to remove");
                Ok(false)
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    fn open(&self) -> LockResult<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Open {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| LockError::Open {
                path: self.path.clone(),
                source,
            })
    }
}

fn write_holder(mut file: &File, holder: &HolderRecord) -> io::Result<()> {
    let payload = serde_json::to_vec(holder).map_err(io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&payload)?;
    file.flush()
}

impl WorkspaceLockGuard {
    pub fn owner(&self) -> &str {
        &self.holder.owner
    }

    pub fn holder(&self) -> &HolderRecord {
        &self.holder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!(error = %e, "Failed to clear lock holder record");
        }
        match FileExt::unlock(&self.file) {
            Ok(()) => info!(
                owner = %self.holder.owner,
                held_ms = self.acquired.elapsed().as_millis() as u64,
                "Workspace lock released"
            ),
            Err(e) => error!(owner = %self.holder.owner, error = %e, "Error releasing workspace lock"),
        }
    }
}

impl std::fmt::Debug for WorkspaceLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceLockGuard")
            .field("path", &self.path)
            .field("owner", &self.holder.owner)
            .finish()
    }
}
