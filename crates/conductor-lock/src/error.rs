//! Lock error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not acquire workspace lock for {owner} within {waited:?}")]
    Timeout { owner: String, waited: Duration },

    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lock operation failed: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

pub type LockResult<T> = std::result::Result<T, LockError>;
