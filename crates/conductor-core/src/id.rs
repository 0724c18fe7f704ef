//! Pipeline and correlation identifiers.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::PipelineKind;

/// Logical identifier of a pipeline.
///
/// Generated locally before any external build id exists, so a ledger row can
/// always be correlated with the build it eventually spawns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Derive a new identifier from the pipeline type, project and creation time.
    ///
    /// A short random suffix keeps identifiers unique when two pipelines for
    /// the same project are created within the same second.
    pub fn generate(kind: PipelineKind, project: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}_{}_{}",
            kind.as_str(),
            project,
            at.format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for PipelineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PipelineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PipelineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier attached to every log line of one coordinator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}
