//! Raw TCP health checks.
//!
//! # Responsibilities
//! - Connect, optionally write the `send` payload
//! - Read the reply until it fuzzy-matches `receive`, the peer closes, or the
//!   probe deadline passes
//!
//! # Design Decisions
//! - No `receive` fragments: a successful connect (and write) is healthy
//! - Connect-only checks never reuse their socket, otherwise a dead peer
//!   would go unnoticed
//! - A reply that arrived but never matched is a Failure, not a timeout
//! - A socket that ended a probe unmatched is not reused, late bytes would
//!   otherwise be credited to the next probe

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use super::{Checker, Outcome, TransportError};
use crate::health::host::HostId;
use crate::health::matcher::PayloadMatcher;

const READ_CHUNK: usize = 4096;

/// Responses are buffered up to this size.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Validated TCP check.
#[derive(Debug, Clone)]
pub struct TcpChecker {
    send: Option<Bytes>,
    receive: PayloadMatcher,
}

impl TcpChecker {
    pub fn new(send: Option<Vec<u8>>, receive: PayloadMatcher) -> Self {
        Self {
            send: send.map(Bytes::from),
            receive,
        }
    }

    fn is_connect_only(&self) -> bool {
        self.send.is_none() && self.receive.is_empty()
    }
}

/// An open socket to one host.
#[derive(Debug)]
pub struct TcpSession {
    stream: TcpStream,
    /// The last exchange ended without a match.
    stale: bool,
}

impl Checker for TcpChecker {
    type Session = TcpSession;

    fn protocol(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&self, host: &HostId) -> Result<TcpSession, TransportError> {
        let stream = TcpStream::connect(host.as_str())
            .await
            .map_err(TransportError::Connect)?;
        let _ = stream.set_nodelay(true);
        Ok(TcpSession { stream, stale: false })
    }

    async fn probe(&self, _host: &HostId, session: &mut TcpSession, deadline: Instant) -> Outcome {
        let stream = &mut session.stream;
        if let Some(send) = &self.send {
            if let Err(e) = stream.write_all(send).await {
                return Outcome::TransportError(e.into());
            }
        }

        if self.receive.is_empty() {
            return Outcome::Success;
        }

        let mut response = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        // Nothing received yet: the scheduler's deadline turns silence into a timeout.
        match stream.read(&mut chunk).await {
            Ok(0) => return Outcome::TransportError(TransportError::Closed),
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e) => return Outcome::TransportError(e.into()),
        }

        while !self.receive.matches(&response) {
            if response.len() >= MAX_RESPONSE_BYTES {
                break;
            }
            match time::timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => response.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Outcome::TransportError(e.into()),
            }
        }

        if self.receive.matches(&response) {
            return Outcome::Success;
        }
        session.stale = true;
        Outcome::Failure(format!(
            "response of {} bytes did not contain expected payload",
            response.len()
        ))
    }

    fn is_reusable(&self, session: &TcpSession) -> bool {
        !self.is_connect_only() && !session.stale
    }
}
