use crate::error::{ResilienceError, Result};
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

/// Largest response body the middleware will buffer for caching and
/// coalescing. Larger bodies fail the buffering step and surface as an
/// instrumentation error.
const MAX_BUFFERED_BODY: usize = 4 * 1024 * 1024;

/// A fully buffered response.
///
/// Cache entries and coalesced results must be cloneable, which a
/// streaming `Response` body is not, so the middleware collects the body
/// into `Bytes` once and re-materializes a `Response` per caller.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    pub async fn from_response(response: Response) -> Result<Self> {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
            .await
            .map_err(|err| ResilienceError::BodyBuffer(err.to_string()))?;

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body: bytes,
        })
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn round_trips_status_headers_and_body() {
        let original = (
            StatusCode::CREATED,
            [("content-type", "application/json")],
            r#"{"ok":true}"#,
        )
            .into_response();

        let buffered = BufferedResponse::from_response(original).await.unwrap();
        assert_eq!(buffered.status, StatusCode::CREATED);
        assert_eq!(buffered.body.as_ref(), br#"{"ok":true}"#);
        assert!(buffered.is_success());

        let clone = buffered.clone();
        let rebuilt = clone.into_response();
        assert_eq!(rebuilt.status(), StatusCode::CREATED);
        assert_eq!(
            rebuilt.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn error_statuses_are_not_success() {
        let response = (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
        let buffered = BufferedResponse::from_response(response).await.unwrap();
        assert!(!buffered.is_success());
        assert_eq!(buffered.body.as_ref(), b"boom");
    }
}
