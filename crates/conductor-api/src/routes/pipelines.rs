//! Pipeline ledger and trigger endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use conductor_core::{PipelineId, PipelineKind};
use conductor_coordinator::FileInfo;
use conductor_db::{AnalysisRecord, PipelineRecord, PipelineStatistics, QualityGateSummary};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;
const DEFAULT_STATS_DAYS: i32 = 7;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pipelines))
        .route("/stats", get(statistics))
        .route("/sync", post(trigger_sync))
        .route("/file-ingest", post(trigger_file_ingest))
        .route("/{id}", get(get_pipeline))
        .route("/{id}/analysis", get(get_analysis))
}

#[derive(Debug, Deserialize)]
struct ListPipelinesQuery {
    #[serde(rename = "type")]
    kind: Option<PipelineKind>,
    limit: Option<i64>,
}

async fn list_pipelines(
    State(state): State<AppState>,
    Query(query): Query<ListPipelinesQuery>,
) -> Result<Json<Vec<PipelineRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let pipelines = state.ledger.pipelines.recent(query.kind, limit).await?;
    Ok(Json(pipelines))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PipelineRecord>, ApiError> {
    let pipeline = state.ledger.pipelines.get(&PipelineId::from(id)).await?;
    Ok(Json(pipeline))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    let pipeline_id = PipelineId::from(id);
    state
        .ledger
        .analyses
        .latest_for_pipeline(&pipeline_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no analysis for pipeline {}", pipeline_id)))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    days: Option<i32>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    days: i32,
    pipelines: PipelineStatistics,
    quality_gates: Vec<QualityGateSummary>,
}

async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS);
    if days <= 0 {
        return Err(ApiError::BadRequest("days must be positive".to_string()));
    }
    let pipelines = state.ledger.pipelines.statistics(days).await?;
    let quality_gates = state.ledger.analyses.gate_summary(days).await?;
    Ok(Json(StatsResponse {
        days,
        pipelines,
        quality_gates,
    }))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    pipeline_id: PipelineId,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    commit_hash: String,
    #[serde(default)]
    changes: Vec<serde_json::Value>,
    project: String,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    if req.commit_hash.trim().is_empty() {
        return Err(ApiError::BadRequest("commit_hash is required".to_string()));
    }
    let pipeline_id = state
        .coordinator
        .trigger_sync_pipeline(&req.commit_hash, &req.changes, &req.project)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { pipeline_id })))
}

#[derive(Debug, Deserialize)]
struct FileIngestRequest {
    issue_id: i64,
    external_file_id: i64,
    file: FileInfo,
}

async fn trigger_file_ingest(
    State(state): State<AppState>,
    Json(req): Json<FileIngestRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    // The file row must exist before its pipeline can reference it.
    state.ledger.files.get(req.external_file_id).await?;
    let pipeline_id = state
        .coordinator
        .trigger_file_ingest_pipeline(req.issue_id, &req.file, req.external_file_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { pipeline_id })))
}
