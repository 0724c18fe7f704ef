//! Workspace lock diagnostics.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use conductor_lock::HolderRecord;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(lock_status))
}

#[derive(Debug, Serialize)]
struct LockResponse {
    path: String,
    locked: bool,
    holder: Option<HolderRecord>,
}

async fn lock_status(State(state): State<AppState>) -> Result<Json<LockResponse>, ApiError> {
    let status = state.lock.status()?;
    Ok(Json(LockResponse {
        path: state.lock.path().display().to_string(),
        locked: status.locked,
        holder: status.holder,
    }))
}
