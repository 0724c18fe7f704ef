//! Bundle of repositories shared by the coordinator and the API.

use sqlx::PgPool;
use std::sync::Arc;

use crate::DbResult;
use crate::memory::MemoryLedger;
use crate::repo::*;

/// Handle to every ledger repository.
#[derive(Clone)]
pub struct Ledger {
    pub pipelines: Arc<dyn PipelineRepo>,
    pub analyses: Arc<dyn AnalysisRepo>,
    pub files: Arc<dyn ExternalFileRepo>,
    pub notifications: Arc<dyn NotificationRepo>,
    pub config: Arc<dyn ConfigRepo>,
    pub operations: Arc<dyn OperationRepo>,
    pool: Option<PgPool>,
}

impl Ledger {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            pipelines: Arc::new(PgPipelineRepo::new(pool.clone())),
            analyses: Arc::new(PgAnalysisRepo::new(pool.clone())),
            files: Arc::new(PgExternalFileRepo::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepo::new(pool.clone())),
            config: Arc::new(PgConfigRepo::new(pool.clone())),
            operations: Arc::new(PgOperationRepo::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryLedger::new()))
    }

    /// Use an existing in-memory ledger for every repository.
    pub fn from_memory(memory: Arc<MemoryLedger>) -> Self {
        Self {
            pipelines: memory.clone(),
            analyses: memory.clone(),
            files: memory.clone(),
            notifications: memory.clone(),
            config: memory.clone(),
            operations: memory,
            pool: None,
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Check that the backing store answers.
    pub async fn ping(&self) -> DbResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("postgres", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}
