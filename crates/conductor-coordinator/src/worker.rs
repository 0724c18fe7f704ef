//! Worker-side discipline around the shared working copy.

use conductor_core::PipelineId;
use conductor_lock::WorkspaceLock;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::coordinator::PipelineCoordinator;
use crate::error::CoordinatorResult;

/// Result of one worker cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome<T> {
    Completed(T),
    /// The lock could not be acquired in time; the mutation did not run.
    Abandoned,
}

/// Changes a sync cycle committed to the working copy.
#[derive(Debug, Clone)]
pub struct SyncChanges {
    pub commit_hash: String,
    pub changes: Vec<serde_json::Value>,
}

/// Runs working-copy mutations under the workspace lock.
pub struct WorkingCopyWorker {
    name: String,
    lock: WorkspaceLock,
    wait: Duration,
}

impl WorkingCopyWorker {
    pub fn new(name: impl Into<String>, lock: WorkspaceLock, wait: Duration) -> Self {
        Self {
            name: name.into(),
            lock,
            wait,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the lock, run `mutate`, release the lock.
    pub async fn run_cycle<F, Fut, T>(&self, mutate: F) -> CoordinatorResult<CycleOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = match self.lock.acquire(&self.name, self.wait).await {
            Ok(guard) => guard,
            Err(e) if e.is_timeout() => {
                warn!(worker = %self.name, error = %e, "Working copy busy, abandoning cycle");
                return Ok(CycleOutcome::Abandoned);
            }
            Err(e) => return Err(e.into()),
        };

        let output = mutate().await;
        drop(guard);
        Ok(CycleOutcome::Completed(output))
    }

    /// Run a sync mutation and trigger a pipeline for its commit once the lock is released.
    ///
    /// `mutate` returns `None` when there was nothing to commit.
    pub async fn run_sync_cycle<F, Fut>(
        &self,
        coordinator: &PipelineCoordinator,
        project: &str,
        mutate: F,
    ) -> CoordinatorResult<CycleOutcome<Option<PipelineId>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<SyncChanges>>,
    {
        let changes = match self.run_cycle(mutate).await? {
            CycleOutcome::Completed(Some(changes)) => changes,
            CycleOutcome::Completed(None) => return Ok(CycleOutcome::Completed(None)),
            CycleOutcome::Abandoned => return Ok(CycleOutcome::Abandoned),
        };

        info!(worker = %self.name, commit = %changes.commit_hash, "Working copy updated, triggering pipeline");
        let pipeline_id = coordinator
            .trigger_sync_pipeline(&changes.commit_hash, &changes.changes, project)
            .await?;
        Ok(CycleOutcome::Completed(Some(pipeline_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_cycle_runs_under_lock_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let lock = WorkspaceLock::new(dir.path().join("workspace.lock"));
        let observer = WorkspaceLock::new(dir.path().join("workspace.lock"));
        let worker = WorkingCopyWorker::new("gitsync", lock, Duration::from_secs(1));

        let outcome = worker
            .run_cycle(|| async {
                let status = observer.status().unwrap();
                status.owner().map(str::to_string)
            })
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Completed(Some("gitsync".to_string())));
        assert!(!observer.status().unwrap().locked);
    }

    #[tokio::test]
    async fn test_cycle_abandoned_when_lock_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.lock");
        let holder = WorkspaceLock::new(&path);
        let _guard = holder.acquire("precommit", Duration::from_secs(1)).await.unwrap();

        let worker = WorkingCopyWorker::new("gitsync", WorkspaceLock::new(&path), Duration::from_millis(300));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let outcome = worker
            .run_cycle(|| async move { flag.store(true, Ordering::SeqCst) })
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Abandoned);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
