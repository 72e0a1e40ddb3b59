//! Endpoint for bulk metric updates.

use axum::extract::State;
use axum::http::StatusCode;
use bytes::Bytes;
use tally_metrics::Metric;

use crate::endpoints::common::{ApiError, parse_json};
use crate::service::ServiceState;

/// Handles `POST /updates/` with a JSON array of metrics.
///
/// All metrics are applied as a single bulk update. A single invalid metric rejects the entire
/// request.
pub async fn handle(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let metrics: Vec<Metric> = parse_json(&body)?;
    tally_log::trace!(count = metrics.len(), "received metric batch");

    state.repository().bulk_update(metrics).await?;
    Ok(StatusCode::OK)
}
