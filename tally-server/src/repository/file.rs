use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tally_common::{RetrySchedule, retry};
use tally_metrics::Metric;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::repository::{Repository, StoreError};
use crate::snapshot::{self, SnapshotError};

/// A repository that keeps metrics in an inner repository and snapshots them to a file.
///
/// With a store interval of zero, every successful write is followed by a snapshot. Otherwise
/// snapshots are taken periodically by [`spawn_dumper`](Self::spawn_dumper). Snapshots replace
/// the file atomically, so a crash never leaves a partially written file behind.
#[derive(Debug)]
pub struct FileRepository<R> {
    inner: R,
    path: PathBuf,
    sync_writes: bool,
    schedule: RetrySchedule,
    dump_lock: Mutex<()>,
}

impl<R: Repository> FileRepository<R> {
    /// Creates a file repository around `inner`.
    pub fn new(inner: R, path: impl Into<PathBuf>, store_interval: Duration) -> Self {
        Self {
            inner,
            path: path.into(),
            sync_writes: store_interval.is_zero(),
            schedule: RetrySchedule::default(),
            dump_lock: Mutex::new(()),
        }
    }

    /// Overrides the schedule for retrying failed snapshot writes.
    pub fn with_retry_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot file into the inner repository.
    ///
    /// A missing file restores nothing. Invalid records are logged and skipped. Returns the
    /// number of restored records.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(SnapshotError::Io(error).into()),
        };

        let count = snapshot::restore(contents.as_slice(), &self.inner).await?;
        tally_log::info!(
            path = %self.path.display(),
            records = count,
            "restored metrics from snapshot"
        );
        Ok(count)
    }

    /// Writes all metrics of the inner repository to the snapshot file.
    ///
    /// Failed writes are retried according to the retry schedule.
    pub async fn dump(&self) -> Result<(), StoreError> {
        let _guard = self.dump_lock.lock().await;

        let metrics = self.inner.list().await?;
        let mut contents = Vec::new();
        snapshot::dump(&metrics, &mut contents)?;

        let tmp_path = self.tmp_path();
        let contents = &contents;
        let tmp_path = &tmp_path;
        retry(
            &self.schedule,
            move || async move {
                tokio::fs::write(tmp_path, contents).await?;
                tokio::fs::rename(tmp_path, &self.path).await
            },
            |_| true,
        )
        .await
        .map_err(SnapshotError::Io)?;

        tally_log::debug!(records = metrics.len(), "wrote metrics snapshot");
        Ok(())
    }

    /// Snapshots the repository every `interval` until `shutdown` is cancelled, then takes a
    /// final snapshot.
    ///
    /// With a zero interval, only the final snapshot is taken.
    pub fn spawn_dumper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()>
    where
        R: 'static,
    {
        let repository = Arc::clone(self);

        tokio::spawn(async move {
            if !interval.is_zero() {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => repository.dump_logged().await,
                    }
                }
            } else {
                shutdown.cancelled().await;
            }

            repository.dump_logged().await;
        })
    }

    async fn dump_logged(&self) {
        if let Err(error) = self.dump().await {
            tally_log::error!(
                error = &error as &dyn std::error::Error,
                path = %self.path.display(),
                "failed to write metrics snapshot"
            );
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl<R: Repository> Repository for FileRepository<R> {
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError> {
        let stored = self.inner.update(metric).await?;
        if self.sync_writes {
            self.dump_logged().await;
        }
        Ok(stored)
    }

    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        if metrics.is_empty() {
            return Ok(());
        }

        self.inner.bulk_update(metrics).await?;
        if self.sync_writes {
            self.dump_logged().await;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Metric>, StoreError> {
        self.inner.list().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::repository::IndexedRepository;
    use crate::repository::tests::{check_contract, stored};

    fn repository(path: &Path, store_interval: Duration) -> FileRepository<IndexedRepository> {
        FileRepository::new(IndexedRepository::new(), path, store_interval)
            .with_retry_schedule(RetrySchedule::never())
    }

    #[tokio::test]
    async fn test_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        check_contract(Arc::new(repository(&path, Duration::ZERO))).await;
    }

    #[tokio::test]
    async fn test_sync_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let first = repository(&path, Duration::ZERO);
        first.update(Metric::counter("PollCount", 5)).await.unwrap();
        first.update(Metric::gauge("Alloc", 1.5)).await.unwrap();

        let second = repository(&path, Duration::ZERO);
        assert_eq!(second.restore().await.unwrap(), 2);
        assert_eq!(stored(&second).await, stored(&first).await);
        assert!(!first.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_restore_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let repository = repository(&dir.path().join("missing.json"), Duration::ZERO);

        assert_eq!(repository.restore().await.unwrap(), 0);
        assert!(repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_skips_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"type\":\"counter\",\"delta\":1}\n{\"id\":\"\"}\n",
        )
        .unwrap();

        let repository = repository(&path, Duration::ZERO);
        assert_eq!(repository.restore().await.unwrap(), 1);
        assert_eq!(
            repository.get("a").await.unwrap(),
            Some(Metric::counter("a", 1))
        );
    }

    #[tokio::test]
    async fn test_periodic_mode_does_not_write_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let repository = repository(&path, Duration::from_secs(300));
        repository.update(Metric::counter("a", 1)).await.unwrap();
        assert!(!path.exists());

        repository.dump().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_dumper_writes_final_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let repository = Arc::new(repository(&path, Duration::from_secs(300)));
        let shutdown = CancellationToken::new();
        let handle = repository.spawn_dumper(Duration::from_secs(300), shutdown.clone());

        repository.update(Metric::gauge("Alloc", 2.5)).await.unwrap();
        shutdown.cancel();
        handle.await.unwrap();

        let restored = FileRepository::new(IndexedRepository::new(), &path, Duration::ZERO);
        assert_eq!(restored.restore().await.unwrap(), 1);
        assert_eq!(
            restored.get("Alloc").await.unwrap(),
            Some(Metric::gauge("Alloc", 2.5))
        );
    }

    #[tokio::test]
    async fn test_dump_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("metrics.json");

        let repository = repository(&path, Duration::from_secs(300));
        repository.update(Metric::counter("a", 1)).await.unwrap();

        let error = repository.dump().await.unwrap_err();
        assert!(matches!(error, StoreError::Snapshot(_)));
    }
}
