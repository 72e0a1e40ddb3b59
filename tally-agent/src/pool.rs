use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

/// A bounded pool of concurrent workers draining a job queue.
///
/// Each call to [`run`](Self::run) spawns at most `limit` workers, feeds them every job exactly
/// once and waits until all workers have exited. A limit of `0` runs a single worker.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    /// Creates a pool running up to `limit` jobs concurrently.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Returns the maximum number of concurrent workers.
    pub fn workers(&self) -> usize {
        self.limit.max(1)
    }

    /// Runs `work` for every job and returns the errors of all failed jobs.
    pub async fn run<T, E, F, Fut>(&self, jobs: Vec<T>, work: F) -> Vec<E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        if jobs.is_empty() {
            return Vec::new();
        }

        let workers = self.workers().min(jobs.len());
        let (tx, rx) = flume::bounded(workers * 2);
        let work = Arc::new(work);

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let rx = rx.clone();
            let work = Arc::clone(&work);

            tasks.spawn(async move {
                let mut errors = Vec::new();
                while let Ok(job) = rx.recv_async().await {
                    if let Err(error) = work(job).await {
                        errors.push(error);
                    }
                }
                errors
            });
        }
        drop(rx);

        for job in jobs {
            // Fails only if every worker has panicked.
            if tx.send_async(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut errors = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(worker_errors) => errors.extend(worker_errors),
                Err(error) => {
                    tally_log::error!(error = &error as &dyn Error, "delivery worker failed");
                }
            }
        }

        errors
    }
}
