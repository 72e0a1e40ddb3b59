//! A simple health check endpoint for the storage backend.

use std::error::Error;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::service::ServiceState;
use crate::utils::ApiErrorResponse;

/// Handles `GET /ping`.
pub async fn handle(State(state): State<ServiceState>) -> impl IntoResponse {
    match state.repository().ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            tally_log::error!(error = &error as &dyn Error, "storage health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorResponse::from_error(&error),
            )
                .into_response()
        }
    }
}
