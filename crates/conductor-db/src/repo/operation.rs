//! Operation log and system metric repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbResult;

/// An audit entry for one coordinator operation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OperationRecord {
    pub id: i64,
    pub operation_type: String,
    pub service: String,
    pub status: String,
    pub details: Option<serde_json::Value>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOperation {
    pub operation_type: String,
    pub service: String,
    pub status: String,
    pub details: Option<serde_json::Value>,
    pub duration_seconds: Option<f64>,
}

/// A sample to append to `system_metrics`.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub service: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A stored metric sample.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricRecord {
    pub id: i64,
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_unit: Option<String>,
    pub service: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Filter for [`OperationRepo::metrics`].
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub name: Option<String>,
    pub service: Option<String>,
    pub hours_back: i32,
    pub limit: i64,
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self {
            name: None,
            service: None,
            hours_back: 24,
            limit: 1000,
        }
    }
}

#[async_trait]
pub trait OperationRepo: Send + Sync {
    async fn record(&self, entry: NewOperation) -> DbResult<i64>;

    async fn save_metric(&self, sample: MetricSample) -> DbResult<i64>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> DbResult<Vec<OperationRecord>>;

    /// Samples recorded within `hours_back`, newest first.
    async fn metrics(&self, query: &MetricQuery) -> DbResult<Vec<MetricRecord>>;
}

/// PostgreSQL implementation of OperationRepo.
pub struct PgOperationRepo {
    pool: PgPool,
}

impl PgOperationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationRepo for PgOperationRepo {
    async fn record(&self, entry: NewOperation) -> DbResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO operation_logs (operation_type, service, status, details, duration_seconds)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&entry.operation_type)
        .bind(&entry.service)
        .bind(&entry.status)
        .bind(&entry.details)
        .bind(entry.duration_seconds)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn save_metric(&self, sample: MetricSample) -> DbResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO system_metrics (metric_name, metric_value, metric_unit, service, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&sample.name)
        .bind(sample.value)
        .bind(&sample.unit)
        .bind(&sample.service)
        .bind(&sample.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<OperationRecord>> {
        let records = sqlx::query_as::<_, OperationRecord>(
            "SELECT * FROM operation_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn metrics(&self, query: &MetricQuery) -> DbResult<Vec<MetricRecord>> {
        let records = sqlx::query_as::<_, MetricRecord>(
            r#"
            SELECT * FROM system_metrics
            WHERE created_at >= NOW() - make_interval(hours => $1)
              AND ($2::text IS NULL OR metric_name = $2)
              AND ($3::text IS NULL OR service = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(query.hours_back)
        .bind(&query.name)
        .bind(&query.service)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
