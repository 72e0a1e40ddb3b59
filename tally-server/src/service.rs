use std::fmt;
use std::sync::Arc;

use tally_common::RetrySchedule;
use tally_config::{ServerConfig, StorageKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::repository::{
    DatabaseRepository, FileRepository, IndexedRepository, Repository, RetryingRepository,
    StoreError,
};

/// The storage backend of a running server, along with its background tasks.
pub struct Storage {
    repository: Arc<dyn Repository>,
    dumper: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Storage {
    /// Creates the backend selected by the configuration and prepares it for traffic.
    ///
    /// The file backend restores its snapshot if enabled and starts the snapshot task. The
    /// database backend waits for the database to become reachable and runs migrations.
    pub async fn start(kind: StorageKind) -> Result<Self, StoreError> {
        match kind {
            StorageKind::Memory => {
                tally_log::info!("storing metrics in memory");
                Ok(Self::from_repository(Arc::new(IndexedRepository::new())))
            }
            StorageKind::File {
                path,
                store_interval,
                restore,
            } => {
                tally_log::info!(
                    path = %path.display(),
                    store_interval = ?store_interval,
                    "storing metrics in file"
                );

                let repository =
                    FileRepository::new(IndexedRepository::new(), path, store_interval);
                if restore {
                    repository.restore().await?;
                }

                let repository = Arc::new(repository);
                let shutdown = CancellationToken::new();
                let handle = repository.spawn_dumper(store_interval, shutdown.clone());

                Ok(Self {
                    repository,
                    dumper: Some((shutdown, handle)),
                })
            }
            StorageKind::Database { dsn } => {
                tally_log::info!("storing metrics in database");

                let repository = RetryingRepository::new(
                    DatabaseRepository::connect(&dsn)?,
                    RetrySchedule::default(),
                );
                repository.ping().await?;
                repository.inner().migrate().await?;

                Ok(Self::from_repository(Arc::new(repository)))
            }
        }
    }

    /// Wraps an existing repository without background tasks.
    pub fn from_repository(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            dumper: None,
        }
    }

    /// Returns the shared repository.
    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repository)
    }

    /// Stops background tasks and waits for the final snapshot.
    pub async fn stop(self) {
        let Some((shutdown, handle)) = self.dumper else {
            return;
        };

        shutdown.cancel();
        if let Err(error) = handle.await {
            tally_log::error!(
                error = &error as &dyn std::error::Error,
                "snapshot task failed"
            );
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("repository", &self.repository)
            .field("dumper", &self.dumper.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct StateInner {
    config: Arc<ServerConfig>,
    repository: Arc<dyn Repository>,
}

/// Server state shared by all request handlers.
#[derive(Clone, Debug)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates the state from the configuration and the storage backend.
    pub fn new(config: Arc<ServerConfig>, repository: Arc<dyn Repository>) -> Self {
        Self {
            inner: Arc::new(StateInner { config, repository }),
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the storage backend.
    pub fn repository(&self) -> &dyn Repository {
        self.inner.repository.as_ref()
    }
}
