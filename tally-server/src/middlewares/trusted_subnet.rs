use std::net::IpAddr;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_auth::REAL_IP_HEADER;

use crate::service::ServiceState;
use crate::utils::ApiErrorResponse;

/// Returns the client address from the `X-Real-IP` header.
fn real_ip(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get(REAL_IP_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// A middleware that only admits requests from the trusted subnet.
///
/// Requests without a valid `X-Real-IP` header or with an address outside the subnet are
/// rejected with `403 Forbidden`. Without a configured subnet, all requests pass.
///
/// Use this with [`axum::middleware::from_fn_with_state`].
pub async fn trusted_subnet(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(subnet) = state.config().trusted_subnet() else {
        return next.run(request).await;
    };

    match real_ip(&request) {
        Some(ip) if subnet.contains(ip) => next.run(request).await,
        ip => {
            tally_log::debug!(ip = ?ip, subnet = %subnet, "rejected request from untrusted origin");
            (
                StatusCode::FORBIDDEN,
                ApiErrorResponse::with_detail("untrusted origin"),
            )
                .into_response()
        }
    }
}
