//! Error types for zotag-tab
//!
//! `QueryError` is the aggregation taxonomy; every variant is terminal for
//! the request that raised it. `ApiError` maps it onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::client::RemoteServiceError;

/// Aggregation failures
#[derive(Debug, Error)]
pub enum QueryError {
    /// Remote fetch failed; aborts the whole aggregation
    #[error("Zotero server error: {0}")]
    RemoteService(#[from] RemoteServiceError),

    /// No X-axis tags were supplied
    #[error("No data: at least one X axis tag is required")]
    NoData,

    /// Percent-of-row denominator is zero
    #[error("Cannot normalize row '{0}': row total is zero")]
    Normalization(String),

    /// Query cache storage failed
    #[error("Query cache error: {0}")]
    Cache(#[from] zotag_common::Error),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Aggregation failure
    #[error(transparent)]
    Query(#[from] QueryError),

    /// IO error (image cache)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// zotag-common error
    #[error("Common error: {0}")]
    Common(#[from] zotag_common::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Query(QueryError::NoData) => {
                (StatusCode::BAD_REQUEST, "NO_DATA", self.to_string())
            }
            ApiError::Query(QueryError::Normalization(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NORMALIZATION_ERROR",
                self.to_string(),
            ),
            // The underlying transport detail stays in the log
            ApiError::Query(QueryError::RemoteService(_)) => (
                StatusCode::BAD_GATEWAY,
                "REMOTE_SERVICE_ERROR",
                "Zotero server error".to_string(),
            ),
            ApiError::Query(QueryError::Cache(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                self.to_string(),
            ),
            ApiError::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Common(zotag_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            ApiError::Common(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
