//! HTTP error responses.
//!
//! Every failure leaves the API as `{ "error": { code, message, retryable,
//! status? } }` with the status code from [`FairError::http_status`].

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};

use crate::types::{ErrorPayload, FairError};

#[derive(Debug)]
pub struct ApiError(pub FairError);

impl From<FairError> for ApiError {
    fn from(err: FairError) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        let body = Json(json!({ "error": ErrorPayload::from(&self.0) }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClassifier;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_not_found_shape() {
        let response = ApiError::from(FairError::SessionNotFound("s1".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
        assert_eq!(body["error"]["retryable"], false);
        assert!(body["error"].get("status").is_none());
    }

    #[tokio::test]
    async fn test_upstream_status_passthrough() {
        let err: FairError = ErrorClassifier::classify_http_status(500, "boom", "openai")
            .exhausted(3)
            .into();
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["status"], 502);
        assert_eq!(body["error"]["upstreamStatus"], 500);
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_unauthorized_challenge() {
        let response = ApiError::from(FairError::Unauthorized("no".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
