//! API routes.

pub mod config;
pub mod files;
pub mod health;
pub mod lock;
pub mod metrics;
pub mod pipelines;
pub mod quality;
pub mod status;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .merge(status::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/pipelines", pipelines::router())
        .nest("/lock", lock::router())
        .nest("/config", config::router())
        .nest("/files", files::router())
        .nest("/quality", quality::router())
        .nest("/metrics", metrics::metrics_router())
        .nest("/operations", metrics::operations_router())
}
