//! Notification repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{NotificationStatus, PipelineId};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::{DbError, DbResult};

/// Failed notifications are listed as pending until they reach this many retries.
pub const MAX_NOTIFICATION_RETRIES: i32 = 3;

/// A message destined for the issue tracker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    /// Target issue. Empty for messages that create a new issue.
    pub issue_id: Option<i64>,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub pipeline_id: Option<String>,
    pub analysis_id: Option<i64>,
    pub external_file_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub issue_id: Option<i64>,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub pipeline_id: Option<PipelineId>,
    pub analysis_id: Option<i64>,
    pub external_file_id: Option<i64>,
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create(&self, new: NewNotification) -> DbResult<NotificationRecord>;

    /// Record a delivery outcome.
    ///
    /// `retry_count` increments only on `failed`; `sent_at` is stamped on `sent`.
    async fn update_status(
        &self,
        id: i64,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> DbResult<()>;

    /// Attach the issue a delivery created.
    async fn link_issue(&self, id: i64, issue_id: i64) -> DbResult<()>;

    async fn get(&self, id: i64) -> DbResult<NotificationRecord>;

    /// Pending notifications and failed ones still under the retry limit, oldest first.
    async fn pending(&self, limit: i64) -> DbResult<Vec<NotificationRecord>>;
}

/// PostgreSQL implementation of NotificationRepo.
pub struct PgNotificationRepo {
    pool: PgPool,
}

impl PgNotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepo for PgNotificationRepo {
    async fn create(&self, new: NewNotification) -> DbResult<NotificationRecord> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notifications (issue_id, notification_type, title, body,
                                       pipeline_id, analysis_id, external_file_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.issue_id)
        .bind(&new.notification_type)
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.pipeline_id.as_ref().map(|p| p.as_str()))
        .bind(new.analysis_id)
        .bind(new.external_file_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(notification_id = record.id, kind = %new.notification_type, "Notification recorded");
        Ok(record)
    }

    async fn update_status(
        &self,
        id: i64,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2,
                sent_at = CASE WHEN $2 = 'sent' THEN NOW() ELSE sent_at END,
                error_message = $3,
                retry_count = CASE WHEN $2 = 'failed' THEN retry_count + 1 ELSE retry_count END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    async fn link_issue(&self, id: i64, issue_id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE notifications SET issue_id = $2 WHERE id = $1")
            .bind(id)
            .bind(issue_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> DbResult<NotificationRecord> {
        let record =
            sqlx::query_as::<_, NotificationRecord>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("notification {}", id)))?;
        Ok(record)
    }

    async fn pending(&self, limit: i64) -> DbResult<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT * FROM notifications
            WHERE status = 'pending'
               OR (status = 'failed' AND retry_count < $1)
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(MAX_NOTIFICATION_RETRIES)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
