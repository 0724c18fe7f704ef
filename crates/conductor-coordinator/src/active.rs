//! In-memory set of pipelines being monitored.

use chrono::{DateTime, Utc};
use conductor_core::{PipelineId, PipelineKind};
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

/// A triggered pipeline awaiting a terminal build status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEntry {
    pub pipeline_id: PipelineId,
    pub kind: PipelineKind,
    /// Build-system project the build runs in.
    pub project_ref: String,
    pub external_build_id: i64,
    pub started_at: DateTime<Utc>,
    /// Originating issue of a file-ingest pipeline.
    pub issue_id: Option<i64>,
    pub external_file_id: Option<i64>,
}

impl ActiveEntry {
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }

    /// Whether the entry has been active for longer than `max_age`.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.elapsed(now)
            .to_std()
            .map(|elapsed| elapsed > max_age)
            .unwrap_or(false)
    }
}

/// Insertion-ordered map of active pipelines keyed by logical id.
#[derive(Debug, Default)]
pub struct ActiveSet {
    entries: Mutex<IndexMap<PipelineId, ActiveEntry>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `false` if the pipeline was already present.
    pub async fn insert(&self, entry: ActiveEntry) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.pipeline_id) {
            return false;
        }
        entries.insert(entry.pipeline_id.clone(), entry);
        true
    }

    /// Remove an entry, keeping the order of the rest.
    pub async fn remove(&self, pipeline_id: &PipelineId) -> Option<ActiveEntry> {
        self.entries.lock().await.shift_remove(pipeline_id)
    }

    pub async fn contains(&self, pipeline_id: &PipelineId) -> bool {
        self.entries.lock().await.contains_key(pipeline_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Copy of the entries in insertion order.
    pub async fn snapshot(&self) -> Vec<ActiveEntry> {
        self.entries.lock().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ActiveEntry {
        ActiveEntry {
            pipeline_id: PipelineId::from(id),
            kind: PipelineKind::Sync,
            project_ref: "42".to_string(),
            external_build_id: 1,
            started_at: Utc::now(),
            issue_id: None,
            external_file_id: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_keeps_insertion_order() {
        let set = ActiveSet::new();
        for id in ["c", "a", "b"] {
            assert!(set.insert(entry(id)).await);
        }
        set.remove(&PipelineId::from("a")).await;
        set.insert(entry("d")).await;

        let ids: Vec<String> = set
            .snapshot()
            .await
            .into_iter()
            .map(|e| e.pipeline_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_ignored() {
        let set = ActiveSet::new();
        assert!(set.insert(entry("a")).await);
        assert!(!set.insert(entry("a")).await);
        assert_eq!(set.len().await, 1);
    }

    #[test]
    fn test_expiry() {
        let mut e = entry("a");
        let now = Utc::now();
        e.started_at = now - chrono::Duration::hours(25);
        assert!(e.is_expired(Duration::from_secs(24 * 3600), now));
        assert!(!e.is_expired(Duration::from_secs(26 * 3600), now));
    }
}
