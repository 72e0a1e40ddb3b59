//! Middlewares for the HTTP server.
//!
//! This module exposes tower [layers](tower::Layer) and axum middleware functions. See
//! [`make_app`](crate::server) for the order in which they are registered.

mod decompression;
mod signature;
mod trace;
mod trusted_subnet;

pub use self::decompression::*;
pub use self::signature::*;
pub use self::trace::*;
pub use self::trusted_subnet::*;
