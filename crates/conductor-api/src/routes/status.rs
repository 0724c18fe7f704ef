//! Active pipeline status.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use conductor_coordinator::ActiveStatus;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status(State(state): State<AppState>) -> Json<ActiveStatus> {
    Json(state.coordinator.active_status().await)
}
