use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors produced by the resilience layer itself.
///
/// Coalesced executions broadcast their outcome to every waiter, so the
/// whole taxonomy is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        reset_at_secs: u64,
    },

    #[error("coalesced execution failed for key '{0}'")]
    CoalesceFailed(String),

    #[error("failed to buffer response body: {0}")]
    BodyBuffer(String),

    #[error("no recorded samples for '{0}'")]
    NoData(String),

    #[error("invalid resilience policy: {0}")]
    InvalidPolicy(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }
}

impl IntoResponse for ResilienceError {
    fn into_response(self) -> Response {
        match self {
            ResilienceError::RateLimited {
                retry_after_secs,
                reset_at_secs,
            } => {
                let body = serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "retryAfter": retry_after_secs,
                });
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(value) = retry_after_secs.to_string().parse() {
                    resp.headers_mut().insert("Retry-After", value);
                }
                if let Ok(value) = reset_at_secs.to_string().parse() {
                    resp.headers_mut().insert("X-RateLimit-Reset", value);
                }
                resp
            }
            ResilienceError::NoData(ref key) => {
                let body = ErrorResponse::new("not_found", &format!("no samples recorded for '{}'", key), 404);
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            other => {
                let body = ErrorResponse::new("internal_error", &other.to_string(), 500);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
