//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use conductor_coordinator::CoordinatorError;
use conductor_db::DbError;
use conductor_lock::LockError;
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// A collaborator call failed.
    BadGateway(String),
    /// A required runtime setting is absent.
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ApiError::NotFound(msg),
            DbError::Duplicate(msg) => ApiError::Conflict(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::ConfigurationMissing { .. } => ApiError::Unavailable(err.to_string()),
            CoordinatorError::External(conductor_core::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            CoordinatorError::External(e) => ApiError::BadGateway(e.to_string()),
            CoordinatorError::Persistence(e) => e.into(),
            CoordinatorError::Lock(e) => e.into(),
            CoordinatorError::TransitionRejected(_) => ApiError::Conflict(err.to_string()),
            CoordinatorError::NotTerminal(msg) => ApiError::BadRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_is_unavailable() {
        let err: ApiError = CoordinatorError::ConfigurationMissing {
            service: "build-system".to_string(),
            key: "sync_project_ref".to_string(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_external_failure_is_bad_gateway() {
        let err: ApiError = CoordinatorError::External(conductor_core::Error::external("gitlab", "HTTP 500")).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let err: ApiError = CoordinatorError::Persistence(DbError::NotFound("pipeline x".to_string())).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
