use crate::{
    config::ErrorDetail, handlers::response::TEXT_PLAIN_UTF8,
    services::object_store::StorageError,
};
use axum::{
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Request failures, each mapped to exactly one status code.
///
/// 304 and 412 are not errors: they are decided by the dispatcher from the
/// conditional headers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Method '{0}' not allowed")]
    MethodNotAllowed(Method),

    /// Carries the store's message verbatim.
    #[error("{0}")]
    RangeNotSatisfiable(String),

    /// A ranged fetch found the object but the plain re-fetch did not.
    #[error("Object {key} existed for .get with range, but not without")]
    StoreConsistency { key: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::StoreConsistency { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text error response. Server errors are logged in full; with
    /// [`ErrorDetail::Redacted`] their body is reduced to `internal error`.
    pub fn into_http_response(self, detail: ErrorDetail) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            tracing::error!("{:?}", self);
            match (detail, self) {
                (ErrorDetail::Redacted, _) => "internal error".to_string(),
                (ErrorDetail::Verbose, Self::Internal(err)) => format!("{:?}", err),
                (ErrorDetail::Verbose, other) => other.to_string(),
            }
        } else {
            self.to_string()
        };
        (status, [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_http_response(ErrorDetail::default())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RangeNotSatisfiable => Self::RangeNotSatisfiable(err.to_string()),
            other => Self::Internal(anyhow::Error::new(other).context("object store call failed")),
        }
    }
}
