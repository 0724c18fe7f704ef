//! Pipeline repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::pipeline::merge_metadata;
use conductor_core::{PipelineId, PipelineKind, PipelineStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::{DbError, DbResult};

/// A pipeline record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PipelineRecord {
    pub id: i64,
    pub pipeline_id: String,
    pub pipeline_type: String,
    pub project_name: String,
    pub commit_hash: Option<String>,
    pub branch_name: Option<String>,
    pub status: String,
    pub triggered_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub metadata: serde_json::Value,
}

impl PipelineRecord {
    pub fn logical_id(&self) -> PipelineId {
        PipelineId::from(self.pipeline_id.as_str())
    }

    pub fn status(&self) -> DbResult<PipelineStatus> {
        self.status.parse().map_err(|_| {
            DbError::InvalidData(format!(
                "pipeline {} has status {}",
                self.pipeline_id, self.status
            ))
        })
    }

    pub fn kind(&self) -> DbResult<PipelineKind> {
        self.pipeline_type.parse().map_err(|_| {
            DbError::InvalidData(format!(
                "pipeline {} has type {}",
                self.pipeline_id, self.pipeline_type
            ))
        })
    }

    /// Read a top-level metadata field as a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Read a top-level metadata field as an integer.
    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(|v| v.as_i64())
    }
}

/// Input for creating a pipeline row.
#[derive(Debug, Clone)]
pub struct NewPipeline {
    pub kind: PipelineKind,
    pub project: String,
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
    pub triggered_by: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewPipeline {
    pub fn new(kind: PipelineKind, project: impl Into<String>, triggered_by: impl Into<String>) -> Self {
        Self {
            kind,
            project: project.into(),
            commit_hash: None,
            branch: None,
            triggered_by: triggered_by.into(),
            metadata: None,
        }
    }

    pub fn with_commit(mut self, commit_hash: impl Into<String>) -> Self {
        self.commit_hash = Some(commit_hash.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Aggregate pipeline counts over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PipelineStatistics {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub running: i64,
    pub avg_duration_minutes: Option<f64>,
    /// Percentage of pipelines that succeeded, rounded to two decimals.
    pub success_rate: Option<f64>,
}

#[async_trait]
pub trait PipelineRepo: Send + Sync {
    /// Create a `pending` pipeline with a freshly generated logical id.
    async fn create(&self, new: NewPipeline) -> DbResult<PipelineRecord>;

    /// Apply a status transition.
    ///
    /// Returns `false` without touching the row when the transition would
    /// leave a terminal status or move `running` back to `pending`.
    async fn update_status(
        &self,
        id: &PipelineId,
        status: PipelineStatus,
        duration_seconds: Option<i64>,
        metadata_patch: Option<serde_json::Value>,
    ) -> DbResult<bool>;

    async fn get(&self, id: &PipelineId) -> DbResult<PipelineRecord>;

    /// Newest first, optionally filtered by type.
    async fn recent(&self, kind: Option<PipelineKind>, limit: i64) -> DbResult<Vec<PipelineRecord>>;

    /// Oldest first.
    async fn list_by_status(&self, status: PipelineStatus) -> DbResult<Vec<PipelineRecord>>;

    async fn statistics(&self, days_back: i32) -> DbResult<PipelineStatistics>;
}

/// PostgreSQL implementation of PipelineRepo.
pub struct PgPipelineRepo {
    pool: PgPool,
}

impl PgPipelineRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepo for PgPipelineRepo {
    async fn create(&self, new: NewPipeline) -> DbResult<PipelineRecord> {
        let pipeline_id = PipelineId::generate(new.kind, &new.project, Utc::now());
        let record = sqlx::query_as::<_, PipelineRecord>(
            r#"
            INSERT INTO pipelines (pipeline_id, pipeline_type, project_name, commit_hash,
                                   branch_name, status, triggered_by, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING *
            "#,
        )
        .bind(pipeline_id.as_str())
        .bind(new.kind.as_str())
        .bind(&new.project)
        .bind(&new.commit_hash)
        .bind(&new.branch)
        .bind(&new.triggered_by)
        .bind(new.metadata.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, format!("pipeline {}", pipeline_id)))?;

        info!(pipeline_id = %pipeline_id, kind = %new.kind, project = %new.project, "Pipeline created");
        Ok(record)
    }

    async fn update_status(
        &self,
        id: &PipelineId,
        status: PipelineStatus,
        duration_seconds: Option<i64>,
        metadata_patch: Option<serde_json::Value>,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, serde_json::Value)> = sqlx::query_as(
            "SELECT status, metadata FROM pipelines WHERE pipeline_id = $1 FOR UPDATE",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let (current, mut metadata) =
            row.ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))?;
        let current: PipelineStatus = current
            .parse()
            .map_err(|_| DbError::InvalidData(format!("pipeline {} has status {}", id, current)))?;

        if !current.can_transition_to(status) {
            tx.rollback().await?;
            warn!(pipeline_id = %id, from = %current, to = %status, "Rejected pipeline status transition");
            return Ok(false);
        }

        if let Some(patch) = metadata_patch {
            merge_metadata(&mut metadata, patch);
        }

        sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $2,
                started_at = CASE WHEN $2 = 'running' AND started_at IS NULL
                                  THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('success', 'failed', 'canceled') AND completed_at IS NULL
                                    THEN NOW() ELSE completed_at END,
                duration_seconds = COALESCE($3, duration_seconds),
                metadata = $4
            WHERE pipeline_id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(duration_seconds)
        .bind(metadata)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(pipeline_id = %id, status = %status, "Pipeline status updated");
        Ok(true)
    }

    async fn get(&self, id: &PipelineId) -> DbResult<PipelineRecord> {
        let record =
            sqlx::query_as::<_, PipelineRecord>("SELECT * FROM pipelines WHERE pipeline_id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))?;
        Ok(record)
    }

    async fn recent(&self, kind: Option<PipelineKind>, limit: i64) -> DbResult<Vec<PipelineRecord>> {
        let records = sqlx::query_as::<_, PipelineRecord>(
            r#"
            SELECT * FROM pipelines
            WHERE $1::text IS NULL OR pipeline_type = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn list_by_status(&self, status: PipelineStatus) -> DbResult<Vec<PipelineRecord>> {
        let records = sqlx::query_as::<_, PipelineRecord>(
            "SELECT * FROM pipelines WHERE status = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn statistics(&self, days_back: i32) -> DbResult<PipelineStatistics> {
        let stats = sqlx::query_as::<_, PipelineStatistics>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'success') AS successful,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                ROUND(AVG(duration_seconds) / 60.0, 2)::float8 AS avg_duration_minutes,
                ROUND(COUNT(*) FILTER (WHERE status = 'success') * 100.0
                      / NULLIF(COUNT(*), 0), 2)::float8 AS success_rate
            FROM pipelines
            WHERE created_at >= NOW() - make_interval(days => $1)
            "#,
        )
        .bind(days_back)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
