//! Protocol-specific probes.
//!
//! # Data Flow
//! ```text
//! ProbeScheduler tick
//!     → Checker::connect (only when no reusable session is held)
//!     → Checker::probe (one request/response exchange on the session)
//!     → Outcome { Success | Failure | HardFailure | TransportError }
//! ```
//!
//! # Design Decisions
//! - One checker per protocol, selected once at setup via `ProtocolChecker`
//! - The scheduler is generic over `Checker`, so dispatch is static per host
//! - Deadlines are enforced by the scheduler; a checker only sees the
//!   deadline to decide how long to wait for more response bytes
//! - Transport problems are reported distinctly but count as failures

pub mod grpc;
pub mod http;
pub mod redis;
pub mod tcp;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::health::host::HostId;

pub use self::grpc::GrpcChecker;
pub use self::http::HttpChecker;
pub use self::redis::RedisChecker;
pub use self::tcp::TcpChecker;

/// Result of a single probe.
#[derive(Debug)]
pub enum Outcome {
    Success,
    /// The host answered, but not the way the check expects.
    Failure(String),
    /// The host asked to be taken out of rotation immediately.
    HardFailure(String),
    /// The host could not be reached or the exchange broke down.
    TransportError(TransportError),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success => OutcomeKind::Success,
            Outcome::Failure(_) => OutcomeKind::Failure,
            Outcome::HardFailure(_) => OutcomeKind::HardFailure,
            Outcome::TransportError(_) => OutcomeKind::TransportError,
        }
    }
}

/// Payload-free view of an `Outcome`, as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    HardFailure,
    TransportError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failure => "failure",
            OutcomeKind::HardFailure => "hard_failure",
            OutcomeKind::TransportError => "transport_error",
        }
    }
}

/// Connection-level problems encountered while probing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] axum::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("grpc transport error: {0}")]
    GrpcTransport(#[from] tonic::transport::Error),

    #[error("grpc error: {0}")]
    GrpcStatus(#[from] tonic::Status),
}

/// A protocol that can probe one host over one session.
pub trait Checker: Send + Sync + 'static {
    /// Per-host connection state kept between probes.
    type Session: Send + 'static;

    /// Protocol label for logs and metrics.
    fn protocol(&self) -> &'static str;

    /// Open a new session to `host`.
    fn connect(
        &self,
        host: &HostId,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;

    /// Run one probe over an established session, finishing by `deadline`.
    fn probe(
        &self,
        host: &HostId,
        session: &mut Self::Session,
        deadline: Instant,
    ) -> impl Future<Output = Outcome> + Send;

    /// Whether a held session may be used for the next probe.
    fn is_reusable(&self, _session: &Self::Session) -> bool {
        true
    }
}

/// The configured protocol of a cluster, chosen once from its config.
#[derive(Debug, Clone)]
pub enum ProtocolChecker {
    Http(HttpChecker),
    Tcp(TcpChecker),
    Redis(RedisChecker),
    Grpc(GrpcChecker),
}

impl ProtocolChecker {
    pub fn protocol(&self) -> &'static str {
        match self {
            ProtocolChecker::Http(c) => c.protocol(),
            ProtocolChecker::Tcp(c) => c.protocol(),
            ProtocolChecker::Redis(c) => c.protocol(),
            ProtocolChecker::Grpc(c) => c.protocol(),
        }
    }
}
