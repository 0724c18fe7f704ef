//! Health check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready when the ledger answers and the lock file can be inspected.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ledger = match state.ledger.ping().await {
        Ok(()) => json!({ "status": "ok" }),
        Err(e) => {
            warn!(error = %e, "Ledger unreachable");
            json!({ "status": "error", "error": e.to_string() })
        }
    };
    let lock = match state.lock.status() {
        Ok(status) => json!({ "status": "ok", "locked": status.locked, "owner": status.owner() }),
        Err(e) => {
            warn!(error = %e, "Workspace lock unreadable");
            json!({ "status": "error", "error": e.to_string() })
        }
    };

    let healthy = ledger["status"] == "ok" && lock["status"] == "ok";
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if healthy { "ready" } else { "degraded" },
        "checks": { "ledger": ledger, "lock": lock },
        "active_pipelines": state.coordinator.active().len().await,
    });
    (code, Json(body))
}
