//! Endpoints for reading a single metric.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tally_metrics::{Metric, MetricType};

use crate::endpoints::common::{ApiError, parse_json};
use crate::service::ServiceState;

/// The body of a `POST /value/` request.
#[derive(Debug, Deserialize)]
struct MetricKey {
    id: String,
    #[serde(rename = "type")]
    ty: MetricType,
}

async fn lookup(state: &ServiceState, id: &str, requested: MetricType) -> Result<Metric, ApiError> {
    let metric = state
        .repository()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_owned()))?;

    if metric.ty() != requested {
        return Err(ApiError::TypeMismatch {
            id: metric.id,
            requested,
            stored: metric.value.ty(),
        });
    }

    Ok(metric)
}

/// Handles `GET /value/{type}/{id}` and responds with the plain-text value.
pub async fn handle_path(
    State(state): State<ServiceState>,
    Path((ty, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let requested = ty.parse::<MetricType>()?;
    let metric = lookup(&state, &id, requested).await?;
    Ok(metric.value.to_string())
}

/// Handles `POST /value/` and responds with the stored metric as JSON.
///
/// With a configured secret, the response body is signed.
pub async fn handle_json(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key: MetricKey = parse_json(&body)?;
    let metric = lookup(&state, &key.id, key.ty).await?;

    let body = serde_json::to_vec(&metric).map_err(ApiError::InvalidJson)?;
    let signature = state
        .config()
        .secret_key()
        .and_then(|secret| HeaderValue::try_from(tally_auth::sign(secret, &body)).ok());

    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();

    if let Some(signature) = signature {
        response
            .headers_mut()
            .insert(tally_auth::SIGNATURE_HEADER, signature);
    }

    Ok(response)
}
