//! Quality analysis repository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use conductor_core::PipelineId;
use conductor_core::quality::MetricSnapshot;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::{DbError, DbResult};

/// A persisted quality analysis.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalysisRecord {
    pub id: i64,
    pub pipeline_id: String,
    pub project_key: String,
    pub analysis_key: String,
    pub quality_gate_status: String,
    pub bugs: i64,
    pub vulnerabilities: i64,
    pub code_smells: i64,
    pub coverage_percent: Option<f64>,
    pub duplicated_lines_percent: Option<f64>,
    pub lines_of_code: Option<i64>,
    pub technical_debt_minutes: Option<i64>,
    pub analysis_date: DateTime<Utc>,
    pub dashboard_url: Option<String>,
    pub report_data: Option<serde_json::Value>,
}

impl AnalysisRecord {
    pub fn metrics(&self) -> MetricSnapshot {
        MetricSnapshot {
            bugs: self.bugs,
            vulnerabilities: self.vulnerabilities,
            code_smells: self.code_smells,
            coverage_percent: self.coverage_percent,
            duplicated_lines_percent: self.duplicated_lines_percent,
            lines_of_code: self.lines_of_code,
            technical_debt_minutes: self.technical_debt_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub pipeline_id: PipelineId,
    pub project_key: String,
    pub analysis_key: String,
    pub gate_status: String,
    pub metrics: MetricSnapshot,
    pub dashboard_url: Option<String>,
    pub report: Option<serde_json::Value>,
}

/// Per-project quality-gate aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QualityGateSummary {
    pub project_key: String,
    pub total_analyses: i64,
    pub passed: i64,
    pub failed: i64,
    pub avg_bugs: Option<f64>,
    pub avg_vulnerabilities: Option<f64>,
    pub avg_code_smells: Option<f64>,
    pub avg_coverage: Option<f64>,
}

/// Daily quality averages of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QualityTrendPoint {
    /// UTC calendar day.
    pub day: NaiveDate,
    pub analyses: i64,
    pub avg_bugs: Option<f64>,
    pub avg_vulnerabilities: Option<f64>,
    pub avg_code_smells: Option<f64>,
    pub avg_coverage: Option<f64>,
}

/// Gate statuses counted as passed in summaries.
pub const PASSED_GATES: [&str; 2] = ["OK", "PASSED"];
/// Gate statuses counted as failed in summaries.
pub const FAILED_GATES: [&str; 2] = ["ERROR", "FAILED"];

#[async_trait]
pub trait AnalysisRepo: Send + Sync {
    async fn save(&self, new: NewAnalysis) -> DbResult<AnalysisRecord>;

    /// Most recent analysis linked to a pipeline.
    async fn latest_for_pipeline(&self, pipeline_id: &PipelineId) -> DbResult<Option<AnalysisRecord>>;

    async fn gate_summary(&self, days_back: i32) -> DbResult<Vec<QualityGateSummary>>;

    /// Per-day averages for a project over the last `days_back` days, oldest day first.
    async fn trends(&self, project_key: &str, days_back: i32) -> DbResult<Vec<QualityTrendPoint>>;
}

/// PostgreSQL implementation of AnalysisRepo.
pub struct PgAnalysisRepo {
    pool: PgPool,
}

impl PgAnalysisRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisRepo for PgAnalysisRepo {
    async fn save(&self, new: NewAnalysis) -> DbResult<AnalysisRecord> {
        let m = &new.metrics;
        let record = sqlx::query_as::<_, AnalysisRecord>(
            r#"
            INSERT INTO quality_analyses (
                pipeline_id, project_key, analysis_key, quality_gate_status,
                bugs, vulnerabilities, code_smells, coverage_percent,
                duplicated_lines_percent, lines_of_code, technical_debt_minutes,
                dashboard_url, report_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(new.pipeline_id.as_str())
        .bind(&new.project_key)
        .bind(&new.analysis_key)
        .bind(&new.gate_status)
        .bind(m.bugs)
        .bind(m.vulnerabilities)
        .bind(m.code_smells)
        .bind(m.coverage_percent)
        .bind(m.duplicated_lines_percent)
        .bind(m.lines_of_code)
        .bind(m.technical_debt_minutes)
        .bind(&new.dashboard_url)
        .bind(&new.report)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("pipeline {}", new.pipeline_id))
            }
            other => DbError::Database(other),
        })?;

        info!(
            analysis_id = record.id,
            pipeline_id = %new.pipeline_id,
            project_key = %new.project_key,
            gate = %new.gate_status,
            "Quality analysis saved"
        );
        Ok(record)
    }

    async fn latest_for_pipeline(&self, pipeline_id: &PipelineId) -> DbResult<Option<AnalysisRecord>> {
        let record = sqlx::query_as::<_, AnalysisRecord>(
            r#"
            SELECT * FROM quality_analyses
            WHERE pipeline_id = $1
            ORDER BY analysis_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn gate_summary(&self, days_back: i32) -> DbResult<Vec<QualityGateSummary>> {
        let summaries = sqlx::query_as::<_, QualityGateSummary>(
            r#"
            SELECT
                project_key,
                COUNT(*) AS total_analyses,
                COUNT(*) FILTER (WHERE quality_gate_status = ANY($2)) AS passed,
                COUNT(*) FILTER (WHERE quality_gate_status = ANY($3)) AS failed,
                AVG(bugs)::float8 AS avg_bugs,
                AVG(vulnerabilities)::float8 AS avg_vulnerabilities,
                AVG(code_smells)::float8 AS avg_code_smells,
                AVG(coverage_percent) AS avg_coverage
            FROM quality_analyses
            WHERE analysis_date >= NOW() - make_interval(days => $1)
            GROUP BY project_key
            ORDER BY project_key
            "#,
        )
        .bind(days_back)
        .bind(&PASSED_GATES[..])
        .bind(&FAILED_GATES[..])
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    async fn trends(&self, project_key: &str, days_back: i32) -> DbResult<Vec<QualityTrendPoint>> {
        let points = sqlx::query_as::<_, QualityTrendPoint>(
            r#"
            SELECT
                (analysis_date AT TIME ZONE 'UTC')::date AS day,
                COUNT(*) AS analyses,
                AVG(bugs)::float8 AS avg_bugs,
                AVG(vulnerabilities)::float8 AS avg_vulnerabilities,
                AVG(code_smells)::float8 AS avg_code_smells,
                AVG(coverage_percent) AS avg_coverage
            FROM quality_analyses
            WHERE project_key = $1
              AND analysis_date >= NOW() - make_interval(days => $2)
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(project_key)
        .bind(days_back)
        .fetch_all(&self.pool)
        .await?;
        Ok(points)
    }
}
