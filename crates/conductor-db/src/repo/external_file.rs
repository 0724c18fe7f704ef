//! External file repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{FileStatus, PipelineId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::{DbError, DbResult};

/// Version label stored when the caller does not supply one.
pub const DEFAULT_FILE_VERSION: &str = "v1.0";

/// A file ingested from an issue-tracker attachment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExternalFileRecord {
    pub id: i64,
    pub issue_id: i64,
    pub attachment_id: i64,
    pub filename: String,
    pub file_type: String,
    pub file_size_bytes: Option<i64>,
    pub file_path: Option<String>,
    pub version: String,
    pub status: String,
    pub decompiled_path: Option<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
    pub pipeline_id: Option<String>,
    pub analysis_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ExternalFileRecord {
    pub fn status(&self) -> DbResult<FileStatus> {
        self.status.parse().map_err(|_| {
            DbError::InvalidData(format!("external file {} has status {}", self.id, self.status))
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewExternalFile {
    pub issue_id: i64,
    pub attachment_id: i64,
    pub filename: String,
    pub file_type: String,
    pub file_size_bytes: Option<i64>,
    pub file_path: Option<String>,
    pub version: Option<String>,
}

/// Fields changed alongside a status update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub decompiled_path: Option<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
    pub pipeline_id: Option<PipelineId>,
    pub analysis_id: Option<i64>,
}

impl FileUpdate {
    pub fn pipeline(pipeline_id: PipelineId) -> Self {
        Self {
            pipeline_id: Some(pipeline_id),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ExternalFileRepo: Send + Sync {
    async fn create(&self, new: NewExternalFile) -> DbResult<ExternalFileRecord>;

    /// Set the status and overwrite only the fields present in `update`.
    ///
    /// `processed_at` is stamped when the status becomes terminal.
    async fn update_status(&self, id: i64, status: FileStatus, update: FileUpdate) -> DbResult<()>;

    async fn get(&self, id: i64) -> DbResult<ExternalFileRecord>;

    /// Latest record created for an attachment.
    async fn get_by_attachment(&self, attachment_id: i64) -> DbResult<Option<ExternalFileRecord>>;

    /// Files still waiting to be processed, oldest first.
    async fn pending(&self) -> DbResult<Vec<ExternalFileRecord>>;
}

/// PostgreSQL implementation of ExternalFileRepo.
pub struct PgExternalFileRepo {
    pool: PgPool,
}

impl PgExternalFileRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExternalFileRepo for PgExternalFileRepo {
    async fn create(&self, new: NewExternalFile) -> DbResult<ExternalFileRecord> {
        let record = sqlx::query_as::<_, ExternalFileRecord>(
            r#"
            INSERT INTO external_files (issue_id, attachment_id, filename, file_type,
                                        file_size_bytes, file_path, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.issue_id)
        .bind(new.attachment_id)
        .bind(&new.filename)
        .bind(&new.file_type)
        .bind(new.file_size_bytes)
        .bind(&new.file_path)
        .bind(new.version.as_deref().unwrap_or(DEFAULT_FILE_VERSION))
        .fetch_one(&self.pool)
        .await?;

        info!(
            file_id = record.id,
            issue_id = new.issue_id,
            filename = %new.filename,
            "External file record created"
        );
        Ok(record)
    }

    async fn update_status(&self, id: i64, status: FileStatus, update: FileUpdate) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE external_files
            SET status = $2,
                decompiled_path = COALESCE($3, decompiled_path),
                git_commit_hash = COALESCE($4, git_commit_hash),
                git_branch = COALESCE($5, git_branch),
                pipeline_id = COALESCE($6, pipeline_id),
                analysis_id = COALESCE($7, analysis_id),
                processed_at = CASE WHEN $2 IN ('completed', 'failed')
                                    THEN NOW() ELSE processed_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&update.decompiled_path)
        .bind(&update.git_commit_hash)
        .bind(&update.git_branch)
        .bind(update.pipeline_id.as_ref().map(|p| p.as_str()))
        .bind(update.analysis_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("external file {}", id)));
        }
        info!(file_id = id, status = %status, "External file status updated");
        Ok(())
    }

    async fn get(&self, id: i64) -> DbResult<ExternalFileRecord> {
        let record =
            sqlx::query_as::<_, ExternalFileRecord>("SELECT * FROM external_files WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("external file {}", id)))?;
        Ok(record)
    }

    async fn get_by_attachment(&self, attachment_id: i64) -> DbResult<Option<ExternalFileRecord>> {
        let record = sqlx::query_as::<_, ExternalFileRecord>(
            r#"
            SELECT * FROM external_files
            WHERE attachment_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(attachment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn pending(&self) -> DbResult<Vec<ExternalFileRecord>> {
        let records = sqlx::query_as::<_, ExternalFileRecord>(
            "SELECT * FROM external_files WHERE status = 'pending' ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
