//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the health
//! engine. All types derive Serde traits for deserialization from config files.
//! Semantic checks live in `validation.rs`; nothing here is trusted until it
//! has been turned into `HealthCheckSettings`.

use serde::{Deserialize, Serialize};

/// Root configuration for the health engine daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Monitored host pools, one health check definition per pool.
    pub clusters: Vec<ClusterConfig>,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A pool of upstream hosts sharing one health check definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClusterConfig {
    /// Unique cluster identifier for logging/metrics.
    pub name: String,

    /// Host authorities (`host:port`) to monitor.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Health check applied to every host in the pool.
    pub health_check: HealthCheckConfig,
}

/// Health check configuration for one cluster.
///
/// Exactly one of `http`, `tcp`, `redis` or `grpc` must be set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HealthCheckConfig {
    /// Probe deadline in milliseconds.
    pub timeout_ms: u64,

    /// Base probe period in milliseconds.
    pub interval_ms: u64,

    /// Upper bound of the random delay added to every period.
    #[serde(default)]
    pub interval_jitter_ms: u64,

    /// Upper bound of the random delay before a host's first probe.
    #[serde(default)]
    pub initial_jitter_ms: u64,

    /// Base period used while a host is unhealthy. Falls back to `interval_ms`.
    #[serde(default)]
    pub unhealthy_interval_ms: Option<u64>,

    /// Consecutive failures needed to mark a host unhealthy.
    pub unhealthy_threshold: u32,

    /// Consecutive successes needed to mark a host healthy.
    pub healthy_threshold: u32,

    /// Keep the transport connection open between probes.
    #[serde(default = "default_reuse_connection")]
    pub reuse_connection: bool,

    /// How probe results interact with DRAINING/TIMEOUT overrides.
    #[serde(default)]
    pub override_policy: OverridePolicy,

    #[serde(default)]
    pub http: Option<HttpHealthCheck>,

    #[serde(default)]
    pub tcp: Option<TcpHealthCheck>,

    #[serde(default)]
    pub redis: Option<RedisHealthCheck>,

    #[serde(default)]
    pub grpc: Option<GrpcHealthCheck>,
}

fn default_reuse_connection() -> bool {
    true
}

/// Policy applied when probe results arrive for a host with an override.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Overrides always win over probe results.
    Sticky,
    /// A hard failure clears the override and publishes UNHEALTHY.
    #[default]
    HardFailureDemotes,
    /// Hard failures and threshold-reaching failures both clear the override.
    FailureDemotes,
}

impl OverridePolicy {
    pub fn demotes_on_hard_failure(self) -> bool {
        !matches!(self, OverridePolicy::Sticky)
    }

    pub fn demotes_on_failure(self) -> bool {
        matches!(self, OverridePolicy::FailureDemotes)
    }
}

/// A byte sequence given either as hex text or as raw bytes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Hex-encoded bytes, e.g. `"50494E47"` for `PING`.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

/// HTTP health check.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpHealthCheck {
    /// Host header override. Defaults to the probed host authority.
    #[serde(default)]
    pub host: Option<String>,

    /// Request path.
    pub path: String,

    /// Request body. When set the probe is sent as a POST.
    #[serde(default)]
    pub send: Option<Payload>,

    /// Payload that must be found in the response body.
    #[serde(default)]
    pub receive: Option<Payload>,

    /// Expected value of the upstream's cluster identity header.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Half-open status ranges counted as healthy. Defaults to `[200, 300)`.
    #[serde(default)]
    pub expected_statuses: Vec<StatusRange>,
}

/// Half-open range of HTTP status codes, `[start, end)`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusRange {
    pub start: u16,
    pub end: u16,
}

/// Raw TCP health check.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TcpHealthCheck {
    /// Bytes written after connecting. Absent means connect-only.
    #[serde(default)]
    pub send: Option<Payload>,

    /// Fragments expected in the response, in order but not contiguous.
    #[serde(default)]
    pub receive: Vec<Payload>,
}

/// Redis health check (PING, or EXISTS when a key is configured).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RedisHealthCheck {
    /// Maintenance marker key; its presence marks the host unhealthy.
    #[serde(default)]
    pub key: Option<String>,
}

/// gRPC health check (`grpc.health.v1.Health/Check`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct GrpcHealthCheck {
    /// Service name sent in the health check request.
    #[serde(default)]
    pub service_name: Option<String>,
}
