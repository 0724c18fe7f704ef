//! Pipeline, external file and notification lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The kind of work a pipeline performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Analysis of commits synchronised into the shared working copy.
    Sync,
    /// Analysis of a file ingested from an issue-tracker attachment.
    FileIngest,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Sync => "sync",
            PipelineKind::FileIngest => "file-ingest",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(PipelineKind::Sync),
            "file-ingest" => Ok(PipelineKind::FileIngest),
            other => Err(Error::InvalidInput(format!("unknown pipeline type: {other}"))),
        }
    }
}

/// Status of a pipeline as recorded in the ledger.
///
/// Status only moves forward: `pending → running → {success, failed, canceled}`,
/// and a pending pipeline may fail or be canceled before it ever runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl PipelineStatus {
    pub const TERMINAL: [PipelineStatus; 3] = [
        PipelineStatus::Success,
        PipelineStatus::Failed,
        PipelineStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Success | PipelineStatus::Failed | PipelineStatus::Canceled
        )
    }

    /// Whether a row currently in `self` may be moved to `next`.
    ///
    /// Re-applying the current non-terminal status is allowed; it only
    /// merges metadata and never re-stamps timestamps.
    pub fn can_transition_to(&self, next: PipelineStatus) -> bool {
        match (self, next) {
            (current, _) if current.is_terminal() => false,
            (PipelineStatus::Running, PipelineStatus::Pending) => false,
            _ => true,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PipelineStatus::Pending),
            "running" => Ok(PipelineStatus::Running),
            "success" => Ok(PipelineStatus::Success),
            "failed" => Ok(PipelineStatus::Failed),
            "canceled" => Ok(PipelineStatus::Canceled),
            other => Err(Error::InvalidInput(format!("unknown pipeline status: {other}"))),
        }
    }
}

/// Processing status of an external file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown file status: {other}"))),
        }
    }
}

/// Delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown notification status: {other}"
            ))),
        }
    }
}

/// Deep-merge `patch` into `base`.
///
/// Objects merge key by key, recursively. Any other value in the patch
/// replaces the value in the base, including `null`.
pub fn merge_metadata(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_metadata(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use PipelineStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Canceled));
        assert!(!Running.can_transition_to(Pending));

        for terminal in PipelineStatus::TERMINAL {
            for next in [Pending, Running, Success, Failed, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [PipelineKind::Sync, PipelineKind::FileIngest] {
            assert_eq!(kind.as_str().parse::<PipelineKind>().unwrap(), kind);
        }
        assert!("precommit".parse::<PipelineKind>().is_err());
    }

    #[test]
    fn test_merge_metadata_is_deep() {
        let mut base = json!({
            "build": {"id": 7, "url": "http://ci/7"},
            "changes_count": 3
        });
        merge_metadata(
            &mut base,
            json!({"build": {"status": "success"}, "completed_at": "now"}),
        );

        assert_eq!(
            base,
            json!({
                "build": {"id": 7, "url": "http://ci/7", "status": "success"},
                "changes_count": 3,
                "completed_at": "now"
            })
        );
    }

    #[test]
    fn test_merge_metadata_replaces_non_objects() {
        let mut base = json!({"changes": [1, 2, 3]});
        merge_metadata(&mut base, json!({"changes": [4]}));
        assert_eq!(base, json!({"changes": [4]}));

        let mut null_base = serde_json::Value::Null;
        merge_metadata(&mut null_base, json!({"a": 1}));
        assert_eq!(null_base, json!({"a": 1}));
    }
}
