//! Web server endpoints.
//!
//! This module contains the handlers for all metric routes. Each handler maps one repository
//! operation onto HTTP.

use axum::Router;
use axum::routing::{get, post};

use crate::service::ServiceState;

mod batch;
mod common;
mod health_check;
mod index;
mod update;
mod value;

pub use self::common::ApiError;

/// Returns the router with all metric routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/", get(index::handle))
        .route("/ping", get(health_check::handle))
        .route("/update/{ty}/{id}/{value}", post(update::handle_path))
        .route("/update", post(update::handle_json))
        .route("/update/", post(update::handle_json))
        .route("/updates", post(batch::handle))
        .route("/updates/", post(batch::handle))
        .route("/value/{ty}/{id}", get(value::handle_path))
        .route("/value", post(value::handle_json))
        .route("/value/", post(value::handle_json))
}
