//! HTTP error type for rollcall-ri
//!
//! Every handler error renders as `{"error": {"code", "message"}}`.

use crate::geo::GeoError;
use crate::lookup::LookupError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a cycle already running or a review already closed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Address could not be resolved by any path (422)
    #[error("Unresolvable address: {0}")]
    Unresolvable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<rollcall_common::Error> for ApiError {
    fn from(err: rollcall_common::Error) -> Self {
        use rollcall_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Geo(GeoError::EmptyAddress) => {
                ApiError::BadRequest("Address cannot be empty".to_string())
            }
            LookupError::Geo(geo @ GeoError::Unresolvable) => ApiError::Unresolvable(geo.to_string()),
            LookupError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unresolvable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNRESOLVABLE_ADDRESS", msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
