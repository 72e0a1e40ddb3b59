//! Storage backends for metrics.
//!
//! All backends implement the [`Repository`] contract with the same merge semantics: counters add
//! up, gauges are replaced, and an update with a different type replaces the stored metric. The
//! backends are:
//!
//!  - [`MemoryRepository`] and [`IndexedRepository`], which keep metrics in memory only,
//!  - [`FileRepository`], which decorates an in-memory backend with snapshots on disk,
//!  - [`DatabaseRepository`], which stores metrics in PostgreSQL.
//!
//! [`RetryingRepository`] wraps any backend and retries operations that fail with a
//! [transient](StoreError::is_transient) error.

use std::fmt;

use tally_metrics::Metric;

mod database;
mod file;
mod memory;
mod retry;

pub use self::database::*;
pub use self::file::*;
pub use self::memory::*;
pub use self::retry::*;

use crate::snapshot::SnapshotError;

/// An error returned by a [`Repository`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be reached. Retrying may succeed.
    #[error("database connection failed")]
    Unavailable(#[source] sqlx::Error),

    /// Any other database failure.
    #[error("database query failed")]
    Database(#[source] sqlx::Error),

    /// Running the schema migrations failed.
    #[error("failed to migrate the database")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The database holds a row that is not a valid metric.
    #[error("invalid metric record {0:?} in the database")]
    InvalidRecord(String),

    /// Writing or reading the snapshot file failed.
    #[error("snapshot failed")]
    Snapshot(#[source] Box<SnapshotError>),
}

impl StoreError {
    /// Returns `true` if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if is_connection_error(&error) {
            StoreError::Unavailable(error)
        } else {
            StoreError::Database(error)
        }
    }
}

impl From<SnapshotError> for StoreError {
    fn from(error: SnapshotError) -> Self {
        StoreError::Snapshot(Box::new(error))
    }
}

/// Persistent storage for metrics.
///
/// Every operation is atomic with respect to all other operations on the same instance.
#[async_trait::async_trait]
pub trait Repository: fmt::Debug + Send + Sync {
    /// Merges a metric into storage and returns the stored result.
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError>;

    /// Merges a list of metrics as one operation.
    ///
    /// Either all updates are applied, or none. An empty list is a no-op.
    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError>;

    /// Returns the stored metric with the given id.
    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError>;

    /// Returns all stored metrics.
    async fn list(&self) -> Result<Vec<Metric>, StoreError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use similar_asserts::assert_eq;
    use tally_metrics::MetricValue;

    use super::*;

    /// Returns the stored metrics keyed by id, ignoring the order of the backend.
    pub async fn stored(repository: &dyn Repository) -> BTreeMap<String, MetricValue> {
        repository
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|metric| (metric.id, metric.value))
            .collect()
    }

    /// Runs the shared contract against a fresh, empty repository.
    pub async fn check_contract(repository: Arc<dyn Repository>) {
        // Counters add up.
        repository.update(Metric::counter("requests", 5)).await.unwrap();
        let updated = repository.update(Metric::counter("requests", 3)).await.unwrap();
        assert_eq!(updated, Metric::counter("requests", 8));
        assert_eq!(
            repository.get("requests").await.unwrap(),
            Some(Metric::counter("requests", 8))
        );

        // Gauges are replaced.
        repository.update(Metric::gauge("cpu", 12.5)).await.unwrap();
        let updated = repository.update(Metric::gauge("cpu", 9.1)).await.unwrap();
        assert_eq!(updated, Metric::gauge("cpu", 9.1));
        assert_eq!(
            repository.get("cpu").await.unwrap(),
            Some(Metric::gauge("cpu", 9.1))
        );

        // Unknown ids are absent.
        assert_eq!(repository.get("missing").await.unwrap(), None);

        // Bulk updates follow the same rules, including repeated ids.
        repository
            .bulk_update(vec![
                Metric::counter("requests", 2),
                Metric::counter("errors", 1),
                Metric::counter("errors", 1),
                Metric::gauge("cpu", 1.5),
            ])
            .await
            .unwrap();
        repository.bulk_update(Vec::new()).await.unwrap();

        // A type change replaces the stored metric.
        repository.update(Metric::gauge("errors", 0.25)).await.unwrap();

        let expected = BTreeMap::from([
            ("cpu".to_owned(), MetricValue::Gauge(1.5)),
            ("errors".to_owned(), MetricValue::Gauge(0.25)),
            ("requests".to_owned(), MetricValue::Counter(10)),
        ]);
        assert_eq!(stored(repository.as_ref()).await, expected);

        // Counters saturate instead of failing on overflow.
        repository.update(Metric::counter("high", i64::MAX)).await.unwrap();
        let updated = repository.update(Metric::counter("high", 1)).await.unwrap();
        assert_eq!(updated, Metric::counter("high", i64::MAX));

        repository.update(Metric::counter("low", i64::MIN)).await.unwrap();
        repository
            .bulk_update(vec![Metric::counter("low", -1)])
            .await
            .unwrap();
        assert_eq!(
            repository.get("low").await.unwrap(),
            Some(Metric::counter("low", i64::MIN))
        );

        repository.ping().await.unwrap();
    }

    /// Applies concurrent updates and checks that none are lost.
    pub async fn check_concurrent_updates(repository: Arc<dyn Repository>) {
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let repository = Arc::clone(&repository);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        repository.update(Metric::counter("hits", 1)).await.unwrap();
                        repository
                            .bulk_update(vec![Metric::counter("hits", 1), Metric::gauge("last", i as f64)])
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            repository.get("hits").await.unwrap(),
            Some(Metric::counter("hits", 16 * 50 * 2))
        );
        assert!(matches!(
            repository.get("last").await.unwrap(),
            Some(Metric { value: MetricValue::Gauge(_), .. })
        ));
    }
}
