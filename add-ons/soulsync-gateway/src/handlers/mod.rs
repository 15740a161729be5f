//! Route handlers, grouped by audience.

pub(crate) mod chat;
pub(crate) mod moderator;
pub(crate) mod profile;

use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use soulsync_core::EscalationError;

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub(crate) enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EscalationError> for ApiError {
    fn from(err: EscalationError) -> Self {
        if err.is_not_found() {
            return ApiError::NotFound(err.to_string());
        }
        tracing::error!(target: "soulsync::gateway", error = %err, "Request failed");
        ApiError::Internal("internal error".to_string())
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

/// GET /api/v1/health
pub(crate) async fn health(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let pending = state.store.queue()?.pending_count();
    Ok(Json(serde_json::json!({
        "status": "ok",
        "app_name": state.config.app_name,
        "mode": state.orchestrator.config().mode.as_str(),
        "pending_cases": pending,
        "generator": state.orchestrator.generator().map(|g| g.name()),
    })))
}
