use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::utils::GuardError;

/// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    /// A core or store failure
    Guard(GuardError),
    /// Point lookup found nothing
    NotFound(String),
    /// Missing or wrong admin token
    Unauthorized,
    /// Request could not be understood
    BadRequest(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Guard(err) => write!(f, "{}", err),
            ApiError::NotFound(what) => write!(f, "Not found: {}", what),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<GuardError> for ApiError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            other => ApiError::Guard(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Guard(err) => {
                // Store details stay in the log
                tracing::error!(error = %err, event = "request_failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
