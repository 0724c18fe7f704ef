//! Exclusive lock over the shared working copy.
//!
//! Independent worker processes on the same host mutate one checked-out
//! working copy (branch switches, commits, pushes). This crate serialises
//! them with an OS-level advisory lock (`flock` through `fs2`) on a shared
//! lock file, so the guarantee holds across processes and not just threads.
//!
//! The lock is not reentrant: acquiring it twice from the same process, even
//! under the same owner label, blocks like any other contender.

pub mod error;
mod holder;
mod lock;

pub use error::{LockError, LockResult};
pub use holder::{HolderRecord, LockStatus};
pub use lock::{DEFAULT_RETRY_INTERVAL, WorkspaceLock, WorkspaceLockGuard};
