//! Operation log and system metric endpoints.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use conductor_db::{MetricQuery, MetricRecord, OperationRecord};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_OPERATIONS_LIMIT: i64 = 50;

pub fn metrics_router() -> Router<AppState> {
    Router::new().route("/", get(list_metrics))
}

pub fn operations_router() -> Router<AppState> {
    Router::new().route("/", get(list_operations))
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    name: Option<String>,
    service: Option<String>,
    hours: Option<i32>,
    limit: Option<i64>,
}

async fn list_metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<Vec<MetricRecord>>, ApiError> {
    let defaults = MetricQuery::default();
    let hours_back = params.hours.unwrap_or(defaults.hours_back);
    if hours_back <= 0 {
        return Err(ApiError::BadRequest("hours must be positive".to_string()));
    }
    let query = MetricQuery {
        name: params.name,
        service: params.service,
        hours_back,
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIMIT),
    };
    let samples = state.ledger.operations.metrics(&query).await?;
    Ok(Json(samples))
}

#[derive(Debug, Deserialize)]
struct OperationsParams {
    limit: Option<i64>,
}

async fn list_operations(
    State(state): State<AppState>,
    Query(params): Query<OperationsParams>,
) -> Result<Json<Vec<OperationRecord>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_OPERATIONS_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.ledger.operations.recent(limit).await?;
    Ok(Json(records))
}
