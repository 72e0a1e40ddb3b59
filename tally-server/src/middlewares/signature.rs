use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_auth::{SIGNATURE_HEADER, SignatureError};

use crate::service::ServiceState;
use crate::utils::ApiErrorResponse;

/// Maximum size of a request body that is buffered for verification.
const MAX_SIGNED_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A request rejected by [`verify_signature`].
#[derive(Debug, thiserror::Error)]
pub enum SignatureRejection {
    #[error("missing request signature")]
    Missing,

    #[error("failed to read request body")]
    Body(#[source] axum::Error),

    #[error("invalid request signature")]
    Invalid(#[from] SignatureError),
}

impl IntoResponse for SignatureRejection {
    fn into_response(self) -> Response {
        tally_log::debug!(
            error = &self as &dyn std::error::Error,
            "rejected unsigned request"
        );
        (StatusCode::BAD_REQUEST, ApiErrorResponse::from_error(&self)).into_response()
    }
}

/// A middleware that verifies the `HashSHA256` signature of request bodies.
///
/// The signature covers the body exactly as received, before decompression. Verification only
/// happens when a secret is configured. Requests without a signature pass unless signatures are
/// required, in which case `POST` requests without one are rejected.
///
/// Use this with [`axum::middleware::from_fn_with_state`].
pub async fn verify_signature(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Result<Response, SignatureRejection> {
    let config = state.config();
    let Some(secret) = config.secret_key() else {
        return Ok(next.run(request).await);
    };

    let signature = match request.headers().get(SIGNATURE_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| SignatureError::BadEncoding)?
            .to_owned(),
        None if config.require_signature() && request.method() == Method::POST => {
            return Err(SignatureRejection::Missing);
        }
        None => return Ok(next.run(request).await),
    };

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_SIGNED_BODY_SIZE)
        .await
        .map_err(SignatureRejection::Body)?;

    tally_auth::verify(secret, &body, &signature)?;

    let request = Request::from_parts(parts, Body::from(body));
    Ok(next.run(request).await)
}
