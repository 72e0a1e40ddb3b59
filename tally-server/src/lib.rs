//! The tally ingestion server.
//!
//! The server accepts counter and gauge updates over HTTP and stores them in one of several
//! [repositories](repository::Repository):
//!
//!  - in memory only,
//!  - in memory with snapshots to a file, see [`snapshot`],
//!  - in a PostgreSQL database.
//!
//! # Endpoints
//!
//! | Route | Description |
//! |---|---|
//! | `GET /` | HTML table of all metrics |
//! | `POST /update/{type}/{id}/{value}` | Update a single metric from the path |
//! | `POST /update/` | Update a single JSON metric and return the stored metric |
//! | `POST /updates/` | Update a JSON array of metrics in one operation |
//! | `GET /value/{type}/{id}` | Plain-text value of a metric |
//! | `POST /value/` | Stored metric for a JSON `{"id", "type"}` key |
//! | `GET /ping` | Health of the storage backend |
//!
//! Request bodies may be gzip-compressed. With a configured secret, request bodies are verified
//! against the `HashSHA256` header and `POST /value/` responses are signed.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tally_config::ServerConfig;
//! use tally_server::HttpServer;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), tally_server::ServerError> {
//! let config = Arc::new(ServerConfig::default());
//! let server = HttpServer::start(config).await?;
//! server.run(CancellationToken::new()).await
//! # }
//! ```

#![warn(missing_docs)]

mod endpoints;
mod middlewares;
mod server;
mod service;
mod utils;

pub mod repository;
pub mod snapshot;

pub use self::endpoints::ApiError;
pub use self::server::*;
pub use self::service::*;
pub use self::utils::ApiErrorResponse;
