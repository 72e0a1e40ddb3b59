use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tally_config::SendMode;
use tally_metrics::Metric;

use crate::client::{Payload, SendError, UpstreamClient};
use crate::pool::WorkerPool;

/// One or more requests of a delivery failed.
#[derive(Debug)]
pub struct DeliveryError {
    errors: Vec<SendError>,
}

impl DeliveryError {
    fn check(errors: Vec<SendError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self { errors })
        }
    }

    /// Returns the errors of all failed requests.
    pub fn errors(&self) -> &[SendError] {
        &self.errors
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} request(s) failed", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {}", tally_log::LogError(error))?;
        }
        Ok(())
    }
}

impl Error for DeliveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|e| e as &dyn Error)
    }
}

impl From<SendError> for DeliveryError {
    fn from(error: SendError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Delivery strategy for a list of metrics.
#[derive(Clone, Debug)]
pub enum Sender {
    /// One request per metric to `/update/{type}/{id}/{value}`.
    Url {
        /// Client of the upstream.
        client: UpstreamClient,
        /// Pool bounding concurrent requests.
        pool: WorkerPool,
    },
    /// One request per metric with a JSON body to `/update/`.
    Json {
        /// Client of the upstream.
        client: UpstreamClient,
        /// Pool bounding concurrent requests.
        pool: WorkerPool,
    },
    /// A single gzip-compressed JSON array to `/updates/`.
    Bulk {
        /// Client of the upstream.
        client: UpstreamClient,
    },
}

impl Sender {
    /// Creates a sender for the given mode.
    ///
    /// The rate limit only applies to per-metric modes.
    pub fn new(mode: SendMode, client: UpstreamClient, rate_limit: usize) -> Self {
        let pool = WorkerPool::new(rate_limit);
        match mode {
            SendMode::Url => Self::Url { client, pool },
            SendMode::Json => Self::Json { client, pool },
            SendMode::Bulk => Self::Bulk { client },
        }
    }

    /// Returns the delivery mode of this sender.
    pub fn mode(&self) -> SendMode {
        match self {
            Self::Url { .. } => SendMode::Url,
            Self::Json { .. } => SendMode::Json,
            Self::Bulk { .. } => SendMode::Bulk,
        }
    }

    /// Delivers all metrics to the upstream.
    ///
    /// An empty list sends nothing. Per-metric modes attempt every metric, even if some fail, and
    /// report all failures together.
    pub async fn send(&self, metrics: Vec<Metric>) -> Result<(), DeliveryError> {
        match self {
            Self::Url { client, pool } => {
                let client = client.clone();
                let errors = pool
                    .run(metrics, move |metric| {
                        let client = client.clone();
                        async move { send_path(&client, metric).await }
                    })
                    .await;
                DeliveryError::check(errors)
            }
            Self::Json { client, pool } => {
                let client = client.clone();
                let errors = pool
                    .run(metrics, move |metric| {
                        let client = client.clone();
                        async move { send_json(&client, metric).await }
                    })
                    .await;
                DeliveryError::check(errors)
            }
            Self::Bulk { client } => {
                if metrics.is_empty() {
                    return Ok(());
                }
                Ok(send_bulk(client, &metrics).await?)
            }
        }
    }
}

async fn send_path(client: &UpstreamClient, metric: Metric) -> Result<(), SendError> {
    let value = metric.value.to_string();
    let segments = ["update", metric.ty().as_str(), metric.id.as_str(), value.as_str()];
    client.post(&segments, &Payload::empty()).await
}

async fn send_json(client: &UpstreamClient, metric: Metric) -> Result<(), SendError> {
    let body = serde_json::to_vec(&metric)?;
    client.post(&["update", ""], &Payload::json(body)).await
}

async fn send_bulk(client: &UpstreamClient, metrics: &[Metric]) -> Result<(), SendError> {
    let json = serde_json::to_vec(metrics)?;
    let body = compress(&json)?;
    tally_log::debug!(
        metrics = metrics.len(),
        size = body.len(),
        "sending metrics batch"
    );
    client.post(&["updates", ""], &Payload::gzip_json(body)).await
}

fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
