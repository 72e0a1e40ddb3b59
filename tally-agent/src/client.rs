use std::error::Error;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header;
#[doc(inline)]
pub use reqwest::StatusCode;
use tally_common::{RetrySchedule, retry};
use tally_config::AgentConfig;
use url::Url;

/// An error creating the [`UpstreamClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The upstream address is not a valid base URL.
    #[error("invalid upstream url")]
    Url(#[from] url::ParseError),

    /// The HTTP client could not be initialized.
    #[error("failed to build http client")]
    Build(#[source] reqwest::Error),
}

/// An error sending a single request to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Metrics could not be serialized.
    #[error("failed to serialize metrics")]
    Serialize(#[from] serde_json::Error),

    /// The request body could not be compressed.
    #[error("failed to compress metrics")]
    Compress(#[from] io::Error),

    /// The request did not complete.
    #[error("could not send request")]
    Request(#[from] reqwest::Error),

    /// The upstream responded with an unsuccessful status code.
    #[error("upstream responded with {0}")]
    Status(StatusCode),
}

impl SendError {
    /// Returns `true` if sending the same request again may succeed.
    ///
    /// Network errors and server errors are retryable. Rejections by the server are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(error) => !error.is_builder(),
            Self::Status(status) => status.is_server_error(),
            Self::Serialize(_) | Self::Compress(_) => false,
        }
    }
}

/// The body of an upstream request with its content headers.
#[derive(Clone, Debug, Default)]
pub struct Payload {
    data: Bytes,
    content_type: Option<&'static str>,
    content_encoding: Option<&'static str>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a JSON payload.
    pub fn json(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: Some("application/json"),
            content_encoding: None,
        }
    }

    /// Creates a gzip-compressed JSON payload.
    pub fn gzip_json(data: impl Into<Bytes>) -> Self {
        Self {
            content_encoding: Some("gzip"),
            ..Self::json(data)
        }
    }

    /// Returns the bytes sent on the wire.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// HTTP client bound to the ingestion server.
///
/// Every request is retried according to the [`RetrySchedule`]. With a secret key, the body of
/// every request is signed in the [`HashSHA256`](tally_auth::SIGNATURE_HEADER) header. The
/// signature covers the bytes on the wire, after compression.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base: Url,
    secret: Option<Arc<[u8]>>,
    real_ip: Option<IpAddr>,
    schedule: RetrySchedule,
}

impl UpstreamClient {
    /// Creates a client for the upstream of the agent configuration.
    ///
    /// The outbound address of this host is detected once and sent in the `X-Real-IP` header.
    pub fn new(config: &AgentConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.upstream().to_string())?;

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .gzip(true)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base,
            secret: config.secret_key().map(Arc::from),
            real_ip: detect_real_ip(),
            schedule: RetrySchedule::default(),
        })
    }

    /// Replaces the retry schedule of all requests.
    pub fn with_retry_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Overrides the address sent in the `X-Real-IP` header.
    pub fn with_real_ip(mut self, real_ip: Option<IpAddr>) -> Self {
        self.real_ip = real_ip;
        self
    }

    /// Returns the URL for the given path segments.
    ///
    /// Segments are percent-encoded. An empty last segment produces a trailing slash.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        url
    }

    /// Posts a payload to the given path, retrying failed attempts.
    pub async fn post(&self, segments: &[&str], payload: &Payload) -> Result<(), SendError> {
        let url = self.url(segments);
        retry(
            &self.schedule,
            || self.post_once(&url, payload),
            SendError::is_retryable,
        )
        .await
    }

    async fn post_once(&self, url: &Url, payload: &Payload) -> Result<(), SendError> {
        let mut request = self.client.post(url.clone()).body(payload.data.clone());

        if let Some(content_type) = payload.content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(content_encoding) = payload.content_encoding {
            request = request.header(header::CONTENT_ENCODING, content_encoding);
        }
        if let Some(ref secret) = self.secret {
            let signature = tally_auth::sign(secret, payload.data());
            request = request.header(tally_auth::SIGNATURE_HEADER, signature);
        }
        if let Some(real_ip) = self.real_ip {
            request = request.header(tally_auth::REAL_IP_HEADER, real_ip.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status));
        }

        tally_log::trace!(%url, %status, "request delivered");
        Ok(())
    }
}

fn detect_real_ip() -> Option<IpAddr> {
    match local_ip_address::local_ip() {
        Ok(ip) => Some(ip),
        Err(error) => {
            tally_log::warn!(
                error = &error as &dyn Error,
                "cannot detect local ip address, sending without X-Real-IP"
            );
            None
        }
    }
}
