//! Holder record written into the lock file while the lock is held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who holds the lock and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub owner: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl HolderRecord {
    pub(crate) fn current(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    pub(crate) fn parse(content: &str) -> Option<Self> {
        serde_json::from_str(content.trim()).ok()
    }
}

/// Diagnostic view of the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    /// Present when the lock is held and the holder record could be read.
    pub holder: Option<HolderRecord>,
}

impl LockStatus {
    pub(crate) fn free() -> Self {
        Self {
            locked: false,
            holder: None,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.holder.as_ref().map(|h| h.owner.as_str())
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.holder.as_ref().map(|h| h.acquired_at)
    }
}
