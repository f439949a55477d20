//! Axum-specific error types and mappings.
//!
//! Maps `StreamError`, `StoreError` and `CoreError` to HTTP status codes
//! and a JSON body of the form `{"error": ..., "status": ..., "type": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hostctl_core::{CoreError, StoreError, StreamError};
use serde::Serialize;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The resource exists but is in the wrong state for this request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A log source or shell could not be started.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::ServiceUnavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type discriminant for client-side handling
    #[serde(rename = "type")]
    error_type: &'static str,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::ServiceUnavailable(msg)
            | Self::Internal(msg) => msg.clone(),
        };
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "Request failed");
        }

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
            error_type: self.error_type(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StreamError> for HttpError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(msg) => Self::NotFound(msg),
            StreamError::InvalidTarget(msg) => Self::BadRequest(msg),
            StreamError::Closed(msg) => Self::Conflict(msg),
            e @ StreamError::Spawn { .. } => Self::ServiceUnavailable(e.to_string()),
            e @ StreamError::SlowConsumer { .. } => Self::Conflict(e.to_string()),
            StreamError::Store(e) => e.into(),
            StreamError::Io(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(msg) => Self::Internal(format!("Storage: {msg}")),
            StoreError::Serialization(msg) => Self::Internal(format!("Serialization: {msg}")),
        }
    }
}

impl From<CoreError> for HttpError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Stream(e) => e.into(),
            CoreError::Store(e) => e.into(),
            CoreError::Settings(e) => Self::BadRequest(e.to_string()),
            CoreError::Validation(msg) => Self::BadRequest(msg),
            CoreError::Path(e) => Self::Internal(e.to_string()),
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_map_to_statuses() {
        let cases = [
            (StreamError::NotFound("job-1".into()), StatusCode::NOT_FOUND),
            (StreamError::InvalidTarget("-x".into()), StatusCode::BAD_REQUEST),
            (StreamError::Closed("gone".into()), StatusCode::CONFLICT),
            (
                StreamError::spawn("journalctl", "No such file or directory"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StreamError::Store(StoreError::Io("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError::from(err).status(), status);
        }
    }

    #[test]
    fn body_has_stable_shape() {
        let response = HttpError::NotFound("job job-1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
