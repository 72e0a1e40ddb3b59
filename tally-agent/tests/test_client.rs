use std::collections::VecDeque;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use tally_agent::{Payload, SendError, Sender, UpstreamClient};
use tally_common::RetrySchedule;
use tally_config::{AgentConfig, SendMode};
use tally_metrics::Metric;
use tokio::net::TcpListener;

#[derive(Debug)]
struct Captured {
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

/// An upstream that records requests and answers with scripted status codes.
#[derive(Clone, Default)]
struct MockUpstream {
    requests: Arc<Mutex<Vec<Captured>>>,
    statuses: Arc<Mutex<VecDeque<StatusCode>>>,
}

impl MockUpstream {
    async fn start(statuses: &[StatusCode]) -> (Self, SocketAddr) {
        tally_log::init_test!();

        let upstream = Self::default();
        upstream.statuses.lock().extend(statuses.iter().copied());

        let router = Router::new()
            .fallback(capture)
            .with_state(upstream.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        (upstream, addr)
    }

    fn requests(&self) -> usize {
        self.requests.lock().len()
    }
}

async fn capture(
    State(upstream): State<MockUpstream>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    upstream.requests.lock().push(Captured {
        path: uri.path().to_owned(),
        headers,
        body,
    });
    upstream.statuses.lock().pop_front().unwrap_or(StatusCode::OK)
}

fn fast_retries() -> RetrySchedule {
    RetrySchedule::new([
        Duration::from_millis(10),
        Duration::from_millis(10),
        Duration::from_millis(10),
    ])
}

fn client(addr: SocketAddr, key: Option<&str>) -> UpstreamClient {
    let config = AgentConfig::from_json_value(serde_json::json!({
        "upstream": {"address": addr.to_string(), "key": key},
    }))
    .unwrap();

    UpstreamClient::new(&config)
        .unwrap()
        .with_retry_schedule(fast_retries())
        .with_real_ip(Some(IpAddr::from([10, 0, 0, 7])))
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let (upstream, addr) =
        MockUpstream::start(&[StatusCode::SERVICE_UNAVAILABLE, StatusCode::BAD_GATEWAY]).await;

    let result = client(addr, None)
        .post(&["updates", ""], &Payload::json(&b"[]"[..]))
        .await;

    assert!(result.is_ok(), "{result:?}");
    assert_eq!(upstream.requests(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (upstream, addr) = MockUpstream::start(&[StatusCode::BAD_REQUEST]).await;

    let result = client(addr, None)
        .post(&["updates", ""], &Payload::json(&b"[]"[..]))
        .await;

    assert!(
        matches!(result, Err(SendError::Status(status)) if status == StatusCode::BAD_REQUEST),
        "{result:?}"
    );
    assert_eq!(upstream.requests(), 1);
}

#[tokio::test]
async fn test_retries_stop_at_ceiling() {
    let (upstream, addr) = MockUpstream::start(&[StatusCode::INTERNAL_SERVER_ERROR; 10]).await;

    let result = client(addr, None)
        .post(&["updates", ""], &Payload::json(&b"[]"[..]))
        .await;

    assert!(
        matches!(result, Err(SendError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR),
        "{result:?}"
    );
    assert_eq!(upstream.requests(), fast_retries().max_attempts());
}

#[tokio::test]
async fn test_bulk_request() {
    let (upstream, addr) = MockUpstream::start(&[]).await;
    let sender = Sender::new(SendMode::Bulk, client(addr, Some("secret")), 1);

    sender
        .send(vec![Metric::counter("PollCount", 3), Metric::gauge("Alloc", 1.5)])
        .await
        .unwrap();

    let requests = upstream.requests.lock();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.path, "/updates/");
    assert_eq!(request.headers["content-encoding"], "gzip");
    assert_eq!(request.headers["content-type"], "application/json");
    assert_eq!(request.headers["x-real-ip"], "10.0.0.7");

    let signature = request.headers["hashsha256"].to_str().unwrap();
    tally_auth::verify(b"secret", &request.body, signature).unwrap();

    let mut json = String::new();
    GzDecoder::new(&request.body[..])
        .read_to_string(&mut json)
        .unwrap();
    assert_eq!(
        json,
        r#"[{"id":"PollCount","type":"counter","delta":3},{"id":"Alloc","type":"gauge","value":1.5}]"#
    );
}

#[tokio::test]
async fn test_url_requests() {
    let (upstream, addr) = MockUpstream::start(&[]).await;
    let sender = Sender::new(SendMode::Url, client(addr, None), 2);

    sender
        .send(vec![
            Metric::counter("PollCount", 3),
            Metric::gauge("Alloc", 1.5),
            Metric::gauge("CPUutilization1", 12.0),
        ])
        .await
        .unwrap();

    let requests = upstream.requests.lock();
    let mut paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
    paths.sort_unstable();

    assert_eq!(
        paths,
        [
            "/update/counter/PollCount/3",
            "/update/gauge/Alloc/1.5",
            "/update/gauge/CPUutilization1/12",
        ]
    );
    assert!(requests.iter().all(|r| r.body.is_empty()));
    assert!(requests.iter().all(|r| !r.headers.contains_key("hashsha256")));
}

#[tokio::test]
async fn test_json_requests() {
    let (upstream, addr) = MockUpstream::start(&[]).await;
    let sender = Sender::new(SendMode::Json, client(addr, Some("secret")), 0);

    sender
        .send(vec![Metric::counter("PollCount", 3)])
        .await
        .unwrap();

    let requests = upstream.requests.lock();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.path, "/update/");
    assert_eq!(request.body, r#"{"id":"PollCount","type":"counter","delta":3}"#);

    let signature = request.headers["hashsha256"].to_str().unwrap();
    tally_auth::verify(b"secret", &request.body, signature).unwrap();
}

#[tokio::test]
async fn test_partial_failure_reports_each_error() {
    let (upstream, addr) =
        MockUpstream::start(&[StatusCode::BAD_REQUEST, StatusCode::BAD_REQUEST]).await;
    let sender = Sender::new(SendMode::Url, client(addr, None), 1);

    let error = sender
        .send(vec![
            Metric::counter("a", 1),
            Metric::counter("b", 1),
            Metric::counter("c", 1),
        ])
        .await
        .unwrap_err();

    assert_eq!(error.errors().len(), 2);
    assert_eq!(upstream.requests(), 3);
}
