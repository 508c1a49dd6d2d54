//! HTTP error envelope.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use board_core::{ErrorCategory, StorageError};
use serde::{Deserialize, Serialize};

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable detail
    pub message: String,
}

/// Errors returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Repository failure, mapped by category
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Request body, query string or path that axum could not extract
    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    /// Response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(err) => match err {
                StorageError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
                other => match other.category() {
                    ErrorCategory::InvalidParameter => StatusCode::BAD_REQUEST,
                    ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                    ErrorCategory::ReferenceNotFound => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorCategory::Conflict => StatusCode::CONFLICT,
                    ErrorCategory::Storage => StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCategory::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCategory::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
                },
            },
        }
    }

    /// Envelope code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Storage(err) => match err {
                StorageError::InvalidParameter { .. } => "invalid_parameter",
                StorageError::NotFound { .. } => "not_found",
                StorageError::ReferenceNotFound { .. } => "reference_not_found",
                StorageError::LoginTaken { .. } => "login_taken",
                StorageError::Connection { .. } => "storage_unavailable",
                StorageError::Read { .. }
                | StorageError::Write { .. }
                | StorageError::Internal { .. } => "storage_error",
                StorageError::Cancelled { .. } => "cancelled",
                StorageError::DeadlineExceeded { .. } => "deadline_exceeded",
            },
        }
    }

    fn log(&self) {
        match self {
            Self::Storage(err) if err.is_fault() => tracing::error!(error = %err, "storage fault"),
            Self::Storage(err)
                if matches!(
                    err.category(),
                    ErrorCategory::Cancelled | ErrorCategory::DeadlineExceeded
                ) =>
            {
                tracing::warn!(error = %err, "request aborted");
            }
            other => tracing::debug!(error = %other, "request rejected"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_core::UserId;

    fn status_of(err: StorageError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(StorageError::invalid("limit", "abc")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(StorageError::user_not_found(UserId(7))), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(StorageError::user_reference_not_found(UserId(7))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(StorageError::LoginTaken { login: "yan".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StorageError::connection("refused")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(StorageError::read("list_users", "boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(StorageError::Cancelled { operation: "list_users" }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(StorageError::DeadlineExceeded {
                operation: "list_users",
                timeout_ms: 1_000,
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_envelope_carries_code_and_message() {
        let err = ApiError::from(StorageError::user_not_found(UserId(7)));
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "user 7 not found");
        assert_eq!(ApiError::BadRequest("nope".into()).code(), "bad_request");
    }
}
