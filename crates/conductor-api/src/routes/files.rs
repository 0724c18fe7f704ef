//! External file endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use conductor_db::ExternalFileRecord;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(pending_files))
        .route("/{id}", get(get_file))
}

/// Oldest first.
async fn pending_files(State(state): State<AppState>) -> Result<Json<Vec<ExternalFileRecord>>, ApiError> {
    let files = state.ledger.files.pending().await?;
    Ok(Json(files))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ExternalFileRecord>, ApiError> {
    let file = state.ledger.files.get(id).await?;
    Ok(Json(file))
}
