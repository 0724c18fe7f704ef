//! Issue tracker trait.

use async_trait::async_trait;

use crate::Result;

/// Trait for issue trackers receiving pipeline results.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create an issue in a project, returning its id.
    async fn create_issue(&self, project: &str, subject: &str, body: &str) -> Result<i64>;

    /// Add a comment to an existing issue.
    async fn add_comment(&self, issue_id: i64, body: &str) -> Result<()>;
}
