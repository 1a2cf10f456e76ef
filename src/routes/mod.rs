/**
 * Routes Module
 * API route handlers
 */
pub mod admin;
pub mod auth;
pub mod health;
pub mod posts;
pub mod rss;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

/// Error payload shared by every handler
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }
}

/// Success payload for delete-style operations
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub(crate) fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
}

pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))).into_response()
}

pub(crate) fn conflict(message: &str) -> Response {
    (StatusCode::CONFLICT, Json(ErrorResponse::new(message))).into_response()
}

pub(crate) fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
        .into_response()
}

/// Generic 500. The cause goes to the logs, never to the client.
pub(crate) fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_skips_empty_message() {
        let json = serde_json::to_string(&ErrorResponse::new("nope")).unwrap();
        assert_eq!(json, r#"{"error":"nope"}"#);
    }

    #[test]
    fn test_helper_status_codes() {
        assert_eq!(bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            service_unavailable().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
