use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::usage::Plan;

/// Errors surfaced to API callers. Internal detail is logged here and never
/// leaks into the response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("daily limit exceeded")]
    QuotaExceeded {
        plan: Plan,
        reset_time: DateTime<Utc>,
    },

    #[error("all caption models failed: {0}")]
    ProviderUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidInput(msg) => {
                warn!(reason = %msg, "rejected caption request");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": msg, "success": false }),
                )
            }
            ApiError::QuotaExceeded { plan, reset_time } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Daily limit exceeded",
                    "plan": plan,
                    "remaining": 0,
                    "resetTime": reset_time.to_rfc3339(),
                    "success": false,
                }),
            ),
            ApiError::ProviderUnavailable(detail) => {
                error!(detail = %detail, "all caption models failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": "AI service is temporarily unavailable. Try again.",
                        "success": false,
                    }),
                )
            }
            ApiError::Configuration(detail) => {
                error!(detail = %detail, "caption service misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Caption service is not configured", "success": false }),
                )
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "unexpected error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to generate caption", "success": false }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_maps_to_429() {
        let err = ApiError::QuotaExceeded {
            plan: Plan::Free,
            reset_time: Utc::now(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn provider_failure_maps_to_503() {
        let err = ApiError::ProviderUnavailable("upstream 502 from gemma".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unexpected_failure_maps_to_500() {
        let err = ApiError::Internal("task join failure".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
