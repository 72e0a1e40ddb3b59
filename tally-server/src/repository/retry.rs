use tally_common::{RetrySchedule, retry};
use tally_metrics::Metric;

use crate::repository::{Repository, StoreError};

/// Retries writes and pings of the inner repository on transient errors.
///
/// Reads are passed through without retries.
#[derive(Debug)]
pub struct RetryingRepository<R> {
    inner: R,
    schedule: RetrySchedule,
}

impl<R: Repository> RetryingRepository<R> {
    /// Wraps `inner` with the given retry schedule.
    pub fn new(inner: R, schedule: RetrySchedule) -> Self {
        Self { inner, schedule }
    }

    /// Returns the wrapped repository.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<R: Repository> Repository for RetryingRepository<R> {
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError> {
        let inner = &self.inner;
        retry(
            &self.schedule,
            || inner.update(metric.clone()),
            StoreError::is_transient,
        )
        .await
    }

    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        let inner = &self.inner;
        retry(
            &self.schedule,
            || inner.bulk_update(metrics.clone()),
            StoreError::is_transient,
        )
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Metric>, StoreError> {
        self.inner.list().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let inner = &self.inner;
        retry(&self.schedule, || inner.ping(), StoreError::is_transient).await
    }
}
