//! Monitored host identity.

use axum::http::uri::Authority;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a host string is not a `host:port` authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid host '{host}': {reason}")]
pub struct InvalidHostId {
    pub host: String,
    pub reason: &'static str,
}

/// A monitored upstream, identified by its `host:port` authority.
///
/// The same string is used to dial TCP, to build `http://` and `redis://`
/// URIs, and as the default HTTP `Host` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(String);

impl HostId {
    pub fn parse(raw: &str) -> Result<Self, InvalidHostId> {
        let invalid = |reason| InvalidHostId {
            host: raw.to_string(),
            reason,
        };

        let authority = Authority::from_str(raw).map_err(|_| invalid("not a valid authority"))?;
        if authority.as_str().contains('@') {
            return Err(invalid("credentials are not allowed"));
        }
        if authority.port_u16().is_none() {
            return Err(invalid("missing port"));
        }
        Ok(Self(authority.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for HostId {
    type Err = InvalidHostId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for HostId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
