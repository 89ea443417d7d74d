//! Redis health checks.
//!
//! Sends `PING` and expects `PONG`. With a maintenance key configured, sends
//! `EXISTS key` instead: the host is healthy only while the key is absent.

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, RedisError, RedisResult};
use tokio::time::Instant;

use super::{Checker, Outcome, TransportError};
use crate::health::host::HostId;

/// Validated Redis check.
#[derive(Debug, Clone, Default)]
pub struct RedisChecker {
    key: Option<String>,
}

impl RedisChecker {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }

    async fn ping(conn: &mut MultiplexedConnection) -> Outcome {
        let reply: RedisResult<String> = ::redis::cmd("PING").query_async(conn).await;
        match reply {
            Ok(reply) if reply == "PONG" => Outcome::Success,
            Ok(reply) => Outcome::Failure(format!("unexpected PING reply '{reply}'")),
            Err(e) => classify(e),
        }
    }

    async fn exists(conn: &mut MultiplexedConnection, key: &str) -> Outcome {
        let reply: RedisResult<i64> = ::redis::cmd("EXISTS").arg(key).query_async(conn).await;
        match reply {
            Ok(0) => Outcome::Success,
            Ok(_) => Outcome::Failure(format!("maintenance key '{key}' is present")),
            Err(e) => classify(e),
        }
    }
}

/// Split redis errors into transport problems and protocol-level failures.
fn classify(e: RedisError) -> Outcome {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        Outcome::TransportError(e.into())
    } else {
        Outcome::Failure(e.to_string())
    }
}

pub struct RedisSession {
    conn: MultiplexedConnection,
}

impl Checker for RedisChecker {
    type Session = RedisSession;

    fn protocol(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self, host: &HostId) -> Result<RedisSession, TransportError> {
        let client = Client::open(format!("redis://{}/", host))?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(RedisSession { conn })
    }

    async fn probe(&self, _host: &HostId, session: &mut RedisSession, _deadline: Instant) -> Outcome {
        match &self.key {
            Some(key) => Self::exists(&mut session.conn, key).await,
            None => Self::ping(&mut session.conn).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checker::OutcomeKind;
    use ::redis::ErrorKind;

    #[test]
    fn protocol_errors_are_failures() {
        let err = RedisError::from((ErrorKind::ResponseError, "ERR unknown command"));
        assert_eq!(classify(err).kind(), OutcomeKind::Failure);

        let err = RedisError::from((ErrorKind::TypeError, "unexpected reply type"));
        assert_eq!(classify(err).kind(), OutcomeKind::Failure);
    }

    #[test]
    fn io_errors_are_transport_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify(RedisError::from(io)).kind(), OutcomeKind::TransportError);
    }
}
