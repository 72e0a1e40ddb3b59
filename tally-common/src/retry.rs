use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Waits between consecutive attempts of the default schedule.
const DEFAULT_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// A fixed, attempt-indexed backoff schedule.
///
/// After the `n`-th failed attempt, the caller waits for the `n`-th delay and tries again. Once
/// the delays are exhausted, the last error is returned. The default schedule waits 1s, 3s and
/// 5s, which allows four attempts in total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// Creates a schedule from an explicit list of delays.
    pub fn new(delays: impl Into<Vec<Duration>>) -> Self {
        Self {
            delays: delays.into(),
        }
    }

    /// Creates a schedule that never retries.
    pub fn never() -> Self {
        Self { delays: Vec::new() }
    }

    /// Returns the delay after the given number of failed attempts, starting at `1`.
    ///
    /// Returns `None` when no further attempt should be made.
    pub fn delay(&self, failed_attempts: usize) -> Option<Duration> {
        failed_attempts
            .checked_sub(1)
            .and_then(|index| self.delays.get(index))
            .copied()
    }

    /// Returns the total number of attempts, including the first one.
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(DEFAULT_DELAYS)
    }
}

/// Runs `operation` until it succeeds, fails with an error rejected by `is_retryable`, or the
/// schedule is exhausted.
///
/// The wait between attempts only suspends the calling task. On failure, the error of the last
/// attempt is returned.
///
/// # Example
///
/// ```
/// use tally_common::{RetrySchedule, retry};
///
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let result: Result<u32, &str> =
///     retry(&RetrySchedule::never(), || async { Ok(42) }, |_| true).await;
/// assert_eq!(result, Ok(42));
/// # }
/// ```
pub async fn retry<T, E, F, Fut, P>(
    schedule: &RetrySchedule,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let mut failed_attempts = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        failed_attempts += 1;

        if !is_retryable(&error) {
            return Err(error);
        }

        let Some(delay) = schedule.delay(failed_attempts) else {
            tally_log::debug!(
                attempts = failed_attempts,
                error = %error,
                "giving up after retries"
            );
            return Err(error);
        };

        tally_log::debug!(
            attempt = failed_attempts,
            delay = ?delay,
            error = %error,
            "operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.delay(0), None);
        assert_eq!(schedule.delay(1), Some(Duration::from_secs(1)));
        assert_eq!(schedule.delay(2), Some(Duration::from_secs(3)));
        assert_eq!(schedule.delay(3), Some(Duration::from_secs(5)));
        assert_eq!(schedule.delay(4), None);
        assert_eq!(schedule.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_ceiling() {
        let schedule = RetrySchedule::default();
        let calls = Cell::new(0);
        let start = Instant::now();

        let result: Result<(), String> = retry(
            &schedule,
            || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move { Err(format!("attempt {attempt}")) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("attempt 4".to_owned()));
        assert_eq!(calls.get(), schedule.max_attempts());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(9), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let calls = Cell::new(0);
        let start = Instant::now();

        let result: Result<(), &str> = retry(
            &RetrySchedule::default(),
            || {
                calls.set(calls.get() + 1);
                async { Err("permanent") }
            },
            |_| false,
        )
        .await;

        assert_eq!(result, Err("permanent"));
        assert_eq!(calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let calls = Cell::new(0);

        let result: Result<u32, &str> = retry(
            &RetrySchedule::default(),
            || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move { if attempt < 3 { Err("flaky") } else { Ok(7) } }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }
}
