//! Integration configuration endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/{service}", get(service_config))
}

/// Non-secret entries only.
async fn service_config(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let entries = state.ledger.config.all_non_secret(&service).await?;
    Ok(Json(entries))
}
