use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use parley_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable label carried in WebSocket `error` frames.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "validation",
            ServerError::NotFound(_) => "not_found",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::RateLimited => "rate_limited",
            ServerError::Internal(_) => "internal",
        }
    }

    /// Message safe to show a client; internal details stay in the logs.
    pub fn public_reason(&self) -> String {
        match self {
            ServerError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ServerError::Validation(msg),
            StoreError::NotFound(what) => ServerError::NotFound(what),
            StoreError::Unauthorized(msg) => ServerError::Forbidden(msg),
            other => {
                tracing::error!(error = %other, "store failure");
                ServerError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.public_reason(),
            "kind": self.kind(),
        });

        (status, axum::Json(body)).into_response()
    }
}
