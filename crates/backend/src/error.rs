//! Error handling for the backend API.
//!
//! Every error is rendered as a `{"detail": "..."}` body, which is what the
//! connection client parses out of non-2xx responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ErrorDetail;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data
    #[error("{0}")]
    BadRequest(String),

    /// No token stored for the account
    #[error("{0}")]
    NotFound(String),

    /// The presented token does not match the stored one
    #[error("{0}")]
    Conflict(String),

    /// Token storage failed
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            other => tracing::warn!("Request rejected ({}): {}", status, other),
        }

        (status, Json(ErrorDetail::new(self.to_string()))).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
