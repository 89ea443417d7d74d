//! HTTP health checks.
//!
//! # Responsibilities
//! - Issue a request to the configured path over a dedicated HTTP/1.1 connection
//! - Classify the response: 503 is a hard failure, unexpected statuses fail
//! - Optionally verify the body payload and the upstream's cluster identity
//!
//! # Design Decisions
//! - The body is always read to the end so the connection stays usable
//! - Only the first `MAX_BODY_BYTES` are kept and matched against `receive`

use std::ops::Range;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use bytes::Bytes;
use futures_util::StreamExt;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::{Checker, Outcome, TransportError};
use crate::health::host::HostId;
use crate::health::matcher::PayloadMatcher;

/// Response header in which an upstream names the cluster it belongs to.
pub const HEALTHCHECKED_CLUSTER_HEADER: &str = "x-upstream-healthchecked-cluster";

const USER_AGENT: &str = concat!("health-engine/", env!("CARGO_PKG_VERSION"));

/// Body prefix kept for matching; the remainder is read and discarded.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Validated HTTP check.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    host: Option<String>,
    path: String,
    send: Option<Bytes>,
    receive: PayloadMatcher,
    service_name: Option<String>,
    expected_statuses: Vec<Range<u16>>,
}

impl HttpChecker {
    /// Build a checker from already-decoded parts.
    ///
    /// An empty `expected_statuses` means `[200, 300)`.
    pub fn new(
        host: Option<String>,
        path: String,
        send: Option<Vec<u8>>,
        receive: PayloadMatcher,
        service_name: Option<String>,
        expected_statuses: Vec<Range<u16>>,
    ) -> Self {
        let expected_statuses = if expected_statuses.is_empty() {
            vec![200..300]
        } else {
            expected_statuses
        };
        Self {
            host,
            path,
            send: send.map(Bytes::from),
            receive,
            service_name,
            expected_statuses,
        }
    }

    fn build_request(&self, target: &HostId) -> Result<Request<Body>, axum::http::Error> {
        let host = self.host.as_deref().unwrap_or_else(|| target.as_str());
        let (method, body) = match &self.send {
            Some(bytes) => (Method::POST, Body::from(bytes.clone())),
            None => (Method::GET, Body::empty()),
        };

        Request::builder()
            .method(method)
            .uri(self.path.as_str())
            .header(header::HOST, host)
            .header(header::USER_AGENT, HeaderValue::from_static(USER_AGENT))
            .body(body)
    }

    fn is_expected(&self, status: StatusCode) -> bool {
        self.expected_statuses
            .iter()
            .any(|range| range.contains(&status.as_u16()))
    }

    /// Classify a complete response.
    pub(crate) fn evaluate(
        &self,
        status: StatusCode,
        claimed_cluster: Option<&str>,
        body: &[u8],
    ) -> Outcome {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Outcome::HardFailure(format!("upstream responded {status}"));
        }
        if !self.is_expected(status) {
            return Outcome::Failure(format!("unexpected status {status}"));
        }
        if let Some(expected) = &self.service_name {
            if claimed_cluster != Some(expected.as_str()) {
                return Outcome::Failure(format!(
                    "service name mismatch: expected '{}', got {:?}",
                    expected, claimed_cluster
                ));
            }
        }
        if !self.receive.matches(body) {
            return Outcome::Failure("response body did not contain expected payload".to_string());
        }
        Outcome::Success
    }
}

/// Read `body` to the end, keeping at most `MAX_BODY_BYTES` of it.
async fn read_body_prefix(body: Body) -> Result<Vec<u8>, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut kept = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = MAX_BODY_BYTES.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    Ok(kept)
}

/// An open HTTP/1.1 connection to one host.
pub struct HttpSession {
    sender: SendRequest<Body>,
}

impl Checker for HttpChecker {
    type Session = HttpSession;

    fn protocol(&self) -> &'static str {
        "http"
    }

    async fn connect(&self, host: &HostId) -> Result<HttpSession, TransportError> {
        let stream = TcpStream::connect(host.as_str())
            .await
            .map_err(TransportError::Connect)?;
        let _ = stream.set_nodelay(true);

        let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        let host = host.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(host = %host, error = %e, "Health check connection closed with error");
            }
        });

        Ok(HttpSession { sender })
    }

    async fn probe(&self, host: &HostId, session: &mut HttpSession, _deadline: Instant) -> Outcome {
        let request = match self.build_request(host) {
            Ok(request) => request,
            Err(e) => return Outcome::TransportError(e.into()),
        };

        if let Err(e) = session.sender.ready().await {
            return Outcome::TransportError(e.into());
        }
        let response = match session.sender.send_request(request).await {
            Ok(response) => response,
            Err(e) => return Outcome::TransportError(e.into()),
        };

        let status = response.status();
        let claimed_cluster = response
            .headers()
            .get(HEALTHCHECKED_CLUSTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = match read_body_prefix(Body::new(response.into_body())).await {
            Ok(body) => body,
            Err(e) => return Outcome::TransportError(e.into()),
        };

        self.evaluate(status, claimed_cluster.as_deref(), &body)
    }

    fn is_reusable(&self, session: &HttpSession) -> bool {
        !session.sender.is_closed()
    }
}
