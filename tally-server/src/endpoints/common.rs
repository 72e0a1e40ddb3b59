//! Common facilities for the metric endpoints.

use std::error::Error;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tally_metrics::{MetricType, ParseMetricError};

use crate::repository::StoreError;
use crate::utils::ApiErrorResponse;

/// An error returned by a metric endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The metric in the request is invalid.
    #[error("invalid metric")]
    InvalidMetric(#[from] ParseMetricError),

    /// The request body is not valid JSON for this endpoint.
    #[error("invalid JSON data")]
    InvalidJson(#[source] serde_json::Error),

    /// No metric with the requested id exists.
    #[error("metric {0:?} not found")]
    NotFound(String),

    /// The stored metric has a different type than requested.
    #[error("metric {id:?} is a {stored}, not a {requested}")]
    TypeMismatch {
        /// The metric id.
        id: String,
        /// The type in the request.
        requested: MetricType,
        /// The type of the stored metric.
        stored: MetricType,
    },

    /// The storage backend failed.
    #[error("failed to access metric storage")]
    Storage(#[from] StoreError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidMetric(_) | ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            ApiError::Storage(error) if error.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tally_log::error!(error = &self as &dyn Error, "metric request failed");
        } else {
            tally_log::debug!(error = &self as &dyn Error, "rejected metric request");
        }

        (status, ApiErrorResponse::from_error(&self)).into_response()
    }
}

/// Parses a JSON request body, reporting malformed payloads as `400 Bad Request`.
pub fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::InvalidJson)
}
