//! Build system trait and build types.
//!
//! The build system runs the actual CI jobs; the coordinator only triggers
//! them and polls their status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{PipelineStatus, Result};

/// Variables passed to a triggered build.
pub type TriggerVariables = BTreeMap<String, String>;

/// A build accepted by the build system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredBuild {
    /// Identifier assigned by the build system.
    pub external_id: i64,
    /// Link to the build in the build system's UI.
    pub url: Option<String>,
}

/// Status reported by the build system.
///
/// The vocabulary is closed on the build system's side; anything the
/// coordinator does not know is kept verbatim and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    #[serde(untagged)]
    Other(String),
}

impl BuildStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => BuildStatus::Created,
            "waiting_for_resource" => BuildStatus::WaitingForResource,
            "preparing" => BuildStatus::Preparing,
            "pending" => BuildStatus::Pending,
            "running" => BuildStatus::Running,
            "success" => BuildStatus::Success,
            "failed" => BuildStatus::Failed,
            "canceled" | "cancelled" => BuildStatus::Canceled,
            "skipped" => BuildStatus::Skipped,
            "manual" => BuildStatus::Manual,
            "scheduled" => BuildStatus::Scheduled,
            other => BuildStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildStatus::Created => "created",
            BuildStatus::WaitingForResource => "waiting_for_resource",
            BuildStatus::Preparing => "preparing",
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Canceled => "canceled",
            BuildStatus::Skipped => "skipped",
            BuildStatus::Manual => "manual",
            BuildStatus::Scheduled => "scheduled",
            BuildStatus::Other(s) => s,
        }
    }

    /// The pipeline status this build status concludes with, if any.
    pub fn terminal(&self) -> Option<PipelineStatus> {
        match self {
            BuildStatus::Success => Some(PipelineStatus::Success),
            BuildStatus::Failed => Some(PipelineStatus::Failed),
            BuildStatus::Canceled => Some(PipelineStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }
}

/// Result of polling a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: BuildStatus,
    /// Duration in seconds, once the build system knows it.
    pub duration: Option<i64>,
}

/// Trait for build systems.
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Name of this build system, used in logs.
    fn name(&self) -> &'static str;

    /// Start a build of `git_ref` in the given project.
    async fn trigger(
        &self,
        project_ref: &str,
        git_ref: &str,
        variables: &TriggerVariables,
    ) -> Result<TriggeredBuild>;

    /// Get the current status of a build.
    async fn status(&self, project_ref: &str, external_id: i64) -> Result<BuildReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_three_statuses_are_terminal() {
        let terminal: Vec<_> = [
            "created",
            "waiting_for_resource",
            "preparing",
            "pending",
            "running",
            "success",
            "failed",
            "canceled",
            "skipped",
            "manual",
            "scheduled",
            "something_new",
        ]
        .into_iter()
        .map(BuildStatus::parse)
        .filter(BuildStatus::is_terminal)
        .collect();

        assert_eq!(
            terminal,
            vec![BuildStatus::Success, BuildStatus::Failed, BuildStatus::Canceled]
        );
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status = BuildStatus::parse("blocked");
        assert_eq!(status, BuildStatus::Other("blocked".to_string()));
        assert_eq!(status.as_str(), "blocked");
        assert_eq!(status.terminal(), None);
    }
}
