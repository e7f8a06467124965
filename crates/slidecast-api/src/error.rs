//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use slidecast_storage::StorageError;
use slidecast_store::StoreError;
use slidecast_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Worker(#[from] WorkerError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(e) => storage_status(e),
            ApiError::Worker(e) => worker_status(e),
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::Worker(WorkerError::QueueFull(_)) => Some("queue_full"),
            ApiError::Worker(WorkerError::ShuttingDown) => Some("shutting_down"),
            ApiError::Worker(WorkerError::JobBusy(_)) => Some("job_busy"),
            ApiError::Worker(WorkerError::Store(StoreError::InvalidTransition { .. })) => {
                Some("invalid_transition")
            }
            _ => None,
        }
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
        StorageError::InvalidBasePath(_) | StorageError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn worker_status(err: &WorkerError) -> StatusCode {
    match err {
        WorkerError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        WorkerError::Store(StoreError::AlreadyExists(_))
        | WorkerError::Store(StoreError::InvalidTransition { .. })
        | WorkerError::Store(StoreError::Busy(_))
        | WorkerError::JobBusy(_) => StatusCode::CONFLICT,
        WorkerError::Store(StoreError::Model(_)) | WorkerError::Model(_) => {
            StatusCode::BAD_REQUEST
        }
        WorkerError::QueueFull(_) | WorkerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Storage(e) => storage_status(e),
        WorkerError::StageFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        }

        let body = ErrorResponse {
            detail: self.to_string(),
            code: self.code().map(str::to_string),
        };

        (status, Json(body)).into_response()
    }
}

/// Generic body for server errors whose details must not reach clients.
pub(crate) fn redacted_response(status: StatusCode) -> Response {
    let body = ErrorResponse {
        detail: "An internal error occurred".to_string(),
        code: None,
    };
    (status, Json(body)).into_response()
}
