use std::error::Error;
use std::time::Duration;

use tally_config::AgentConfig;
use tally_metrics::{Aggregator, Metric};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, UpstreamClient};
use crate::collector::{RuntimeCollector, SystemCollector, fan_in, spawn_collector};
use crate::sender::{DeliveryError, Sender};

/// Aggregates collected batches and delivers them on a fixed interval.
///
/// The aggregate is never reset. Counters keep their running totals and every delivery sends the
/// full current state, so a failed delivery is superseded by the next one.
#[derive(Debug)]
pub struct Agent {
    sender: Sender,
    aggregator: Aggregator,
    report_interval: Duration,
}

impl Agent {
    /// Creates an agent delivering through `sender` every `report_interval`.
    pub fn new(sender: Sender, report_interval: Duration) -> Self {
        Self {
            sender,
            aggregator: Aggregator::new(),
            report_interval,
        }
    }

    /// Creates an agent with the sender and intervals of the configuration.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ClientError> {
        let client = UpstreamClient::new(config)?;
        let sender = Sender::new(config.send_mode(), client, config.rate_limit());
        Ok(Self::new(sender, config.report_interval()))
    }

    /// Returns the current aggregate.
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Sends the current aggregate once.
    pub async fn deliver(&self) -> Result<(), DeliveryError> {
        let metrics = self.aggregator.snapshot();
        tally_log::debug!(
            metrics = metrics.len(),
            mode = %self.sender.mode(),
            "delivering metrics"
        );
        self.sender.send(metrics).await
    }

    async fn deliver_logged(&self) {
        if let Err(error) = self.deliver().await {
            tally_log::error!(
                error = &error as &dyn Error,
                "failed to deliver metrics"
            );
        }
    }

    /// Merges batches from `input` and delivers on every report tick.
    ///
    /// After `shutdown` is cancelled, the remaining batches of `input` are merged until the
    /// channel closes. Then the aggregate is delivered one last time.
    pub async fn run(&self, mut input: mpsc::Receiver<Vec<Metric>>, shutdown: CancellationToken) {
        let period = self.report_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.deliver_logged().await,
                batch = input.recv() => match batch {
                    Some(batch) => self.aggregator.merge(batch),
                    None => break,
                },
            }
        }

        while let Some(batch) = input.recv().await {
            self.aggregator.merge(batch);
        }

        tally_log::info!("sending final report");
        self.deliver_logged().await;
    }
}

/// Runs the agent with the built-in collectors until `shutdown` is cancelled.
pub async fn run(config: &AgentConfig, shutdown: CancellationToken) -> Result<(), ClientError> {
    let agent = Agent::from_config(config)?;
    let poll_interval = config.poll_interval();

    tally_log::info!(
        upstream = %config.upstream(),
        mode = %config.send_mode(),
        "starting agent"
    );

    let input = fan_in(vec![
        spawn_collector(RuntimeCollector::new(), poll_interval, shutdown.clone()),
        spawn_collector(SystemCollector::new(), poll_interval, shutdown.clone()),
    ]);

    agent.run(input, shutdown).await;
    tally_log::info!("agent stopped");
    Ok(())
}
