//! Endpoints for updating a single metric.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use tally_metrics::Metric;

use crate::endpoints::common::{ApiError, parse_json};
use crate::service::ServiceState;

/// Handles `POST /update/{type}/{id}/{value}`.
pub async fn handle_path(
    State(state): State<ServiceState>,
    Path((ty, id, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let metric = Metric::parse_path(&ty, &id, &value)?;
    state.repository().update(metric).await?;
    Ok(StatusCode::OK)
}

/// Handles `POST /update/` with a JSON metric and responds with the stored metric.
pub async fn handle_json(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Json<Metric>, ApiError> {
    let metric: Metric = parse_json(&body)?;
    let stored = state.repository().update(metric).await?;
    Ok(Json(stored))
}
