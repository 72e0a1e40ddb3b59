//! Periodic producers of metric samples.
//!
//! Every collector runs in its own task started by [`spawn_collector`] and emits batches on a
//! bounded channel. [`fan_in`] merges the channels of all collectors into one. Batches of a single
//! collector keep their order, batches of different collectors interleave arbitrarily.
//!
//! Both functions shut down through channel closure: collectors stop on cancellation and drop
//! their sender, and the merged output closes once every collector channel is drained. Consumers
//! therefore keep receiving until `None` to observe every batch produced before cancellation.

use std::time::Duration;

use tally_metrics::Metric;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

mod runtime;
mod system;

pub use self::runtime::*;
pub use self::system::*;

/// Capacity of collector and fan-in channels, in batches.
const CHANNEL_CAPACITY: usize = 16;

/// A source of metric samples.
pub trait Collector: Send + 'static {
    /// Name of the collector for logging.
    fn name(&self) -> &'static str;

    /// Takes one sample of all metrics of this collector.
    ///
    /// Probes that fail are left out of the batch.
    fn collect(&mut self) -> Vec<Metric>;
}

/// Polls `collector` every `interval` until `shutdown` is cancelled.
///
/// The first poll happens one interval after the call. Empty batches are not sent. The returned
/// channel closes after cancellation.
pub fn spawn_collector<C>(
    mut collector: C,
    interval: Duration,
    shutdown: CancellationToken,
) -> mpsc::Receiver<Vec<Metric>>
where
    C: Collector,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => (),
            }

            let batch = collector.collect();
            if batch.is_empty() {
                continue;
            }

            tally_log::trace!(collector = collector.name(), len = batch.len(), "collected");
            if tx.send(batch).await.is_err() {
                break;
            }
        }

        tally_log::debug!(collector = collector.name(), "collector stopped");
    });

    rx
}

/// Merges the batches of several channels into one channel.
///
/// The output closes once all inputs have closed and their remaining batches are forwarded.
pub fn fan_in(receivers: Vec<mpsc::Receiver<Vec<Metric>>>) -> mpsc::Receiver<Vec<Metric>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    for mut receiver in receivers {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(batch) = receiver.recv().await {
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}
