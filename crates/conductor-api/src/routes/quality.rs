//! Quality analysis endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use conductor_db::QualityTrendPoint;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_TREND_DAYS: i32 = 30;

pub fn router() -> Router<AppState> {
    Router::new().route("/{project_key}/trends", get(trends))
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    days: Option<i32>,
}

#[derive(Debug, Serialize)]
struct TrendsResponse {
    project_key: String,
    days: i32,
    points: Vec<QualityTrendPoint>,
}

async fn trends(
    State(state): State<AppState>,
    Path(project_key): Path<String>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<TrendsResponse>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    if days <= 0 {
        return Err(ApiError::BadRequest("days must be positive".to_string()));
    }
    let points = state.ledger.analyses.trends(&project_key, days).await?;
    Ok(Json(TrendsResponse {
        project_key,
        days,
        points,
    }))
}
