use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tally_config::ServerConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use crate::endpoints;
use crate::middlewares::{self, RequestDecompressionLayer};
use crate::repository::StoreError;
use crate::service::{ServiceState, Storage};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[source] io::Error),

    /// The storage backend could not be started.
    #[error("failed to start metric storage")]
    Storage(#[from] StoreError),

    /// Serving connections failed.
    #[error("http server failed")]
    Serve(#[source] io::Error),
}

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> axum::Router {
    // Service builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(middlewares::trace_http_layer())
        .layer(axum::middleware::from_fn_with_state(
            service.clone(),
            middlewares::trusted_subnet,
        ))
        .layer(axum::middleware::from_fn_with_state(
            service.clone(),
            middlewares::verify_signature,
        ))
        .map_request(middlewares::remove_empty_encoding)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new());

    endpoints::routes().layer(middleware).with_state(service)
}

/// HTTP server hosting the metric endpoints.
///
/// The server owns the storage backend and stops it after the last connection has closed.
#[derive(Debug)]
pub struct HttpServer {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    storage: Storage,
}

impl HttpServer {
    /// Starts the storage backend and binds the listening socket.
    pub async fn start(config: Arc<ServerConfig>) -> Result<Self, ServerError> {
        let storage = Storage::start(config.storage()).await?;

        let addr = config.listen_addr();
        let listener = match TcpListener::bind((addr.host(), addr.port())).await {
            Ok(listener) => listener,
            Err(error) => {
                storage.stop().await;
                return Err(ServerError::BindFailed(error));
            }
        };

        Ok(Self {
            config,
            listener,
            storage,
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` is cancelled.
    ///
    /// After cancellation, open connections are given the configured shutdown timeout to
    /// complete. The storage backend is stopped before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let Self {
            config,
            listener,
            storage,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            tally_log::info!("listening on http://{addr}/");
        }

        let service = ServiceState::new(Arc::clone(&config), storage.repository());
        let app = make_app(service);

        let signal = shutdown.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.cancelled().await;
                tally_log::info!("shutting down HTTP server");
            })
            .into_future();

        let timeout = config.shutdown_timeout();
        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(timeout).await;
        };

        let result = tokio::select! {
            result = server => result,
            () = deadline => {
                tally_log::warn!(
                    timeout = ?timeout,
                    "shutdown timeout expired, dropping open connections"
                );
                Ok(())
            }
        };

        storage.stop().await;
        tally_log::info!("HTTP server stopped");

        result.map_err(ServerError::Serve)
    }
}
