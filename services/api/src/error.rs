//! Error types for the API service and their HTTP representation

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use tutoring::TutoringError;

static PRODUCTION: AtomicBool = AtomicBool::new(false);

/// Hide internal error details from clients when enabled
pub fn set_production_mode(enabled: bool) {
    PRODUCTION.store(enabled, Ordering::Relaxed);
}

fn production_mode() -> bool {
    PRODUCTION.load(Ordering::Relaxed)
}

const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Malformed request body or path
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Error raised by the session workflow
    #[error(transparent)]
    Domain(#[from] TutoringError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] common::error::DatabaseError),
}

impl ApiError {
    /// HTTP status, envelope code, and whether the message is safe to expose
    fn classify(&self) -> (StatusCode, &'static str, bool) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", true),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", true),
            ApiError::Internal(_) | ApiError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false)
            }
            ApiError::Domain(err) => match err {
                TutoringError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", true),
                TutoringError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", true),
                TutoringError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", true),
                TutoringError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", true),
                // Operators need to see which session failed to settle
                TutoringError::Settlement { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", true)
                }
                TutoringError::SideEffect(_) | TutoringError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false)
                }
            },
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Domain(
                TutoringError::Validation(msg)
                | TutoringError::Forbidden(msg)
                | TutoringError::Conflict(msg),
            ) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, exposed) = self.classify();

        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        }

        let message = if exposed || !production_mode() {
            self.client_message()
        } else {
            GENERIC_INTERNAL_MESSAGE.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "timestamp": Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serial_test::serial;
    use uuid::Uuid;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    #[serial]
    async fn test_domain_errors_map_to_status_codes() {
        set_production_mode(false);

        let cases = [
            (
                ApiError::from(TutoringError::validation("bad interval")),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                ApiError::from(TutoringError::not_found("Session", Uuid::nil())),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                ApiError::from(TutoringError::forbidden("not yours")),
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
            ),
            (
                ApiError::from(TutoringError::conflict("double booked")),
                StatusCode::CONFLICT,
                "CONFLICT",
            ),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ];

        for (err, status, code) in cases {
            let (actual_status, body) = render(err).await;
            assert_eq!(actual_status, status);
            assert_eq!(body["error"]["code"], code);
            assert!(body["error"]["timestamp"].is_string());
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_domain_messages_are_passed_through() {
        set_production_mode(true);
        let (_, body) = render(TutoringError::conflict("Tutor is busy").into()).await;
        set_production_mode(false);

        assert_eq!(body["error"]["message"], "Tutor is busy");
    }

    #[tokio::test]
    #[serial]
    async fn test_internal_details_hidden_in_production() {
        set_production_mode(true);
        let (status, body) = render(TutoringError::Store("connection reset".into()).into()).await;
        set_production_mode(false);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], GENERIC_INTERNAL_MESSAGE);
    }

    #[tokio::test]
    #[serial]
    async fn test_internal_details_shown_in_development() {
        set_production_mode(false);
        let (_, body) = render(ApiError::Internal("scheduler down".into())).await;

        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("scheduler down")
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_settlement_failures_keep_their_message() {
        set_production_mode(true);
        let session_id = Uuid::new_v4();
        let (status, body) = render(
            TutoringError::Settlement {
                session_id,
                failed: 1,
                attempted: 2,
            }
            .into(),
        )
        .await;
        set_production_mode(false);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains(&session_id.to_string())
        );
    }
}
