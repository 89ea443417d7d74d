//! Validated health check settings.
//!
//! `HealthCheckSettings` is the only form in which a `HealthCheckConfig`
//! reaches the engine: durations are typed, payloads are decoded, and the
//! protocol has been resolved to a single `ProtocolChecker`.

use std::time::Duration;

use crate::config::schema::{HealthCheckConfig, OverridePolicy, Payload};
use crate::config::validation::{ValidationError, ValidationErrorKind};
use crate::health::checker::{GrpcChecker, HttpChecker, ProtocolChecker, RedisChecker, TcpChecker};
use crate::health::matcher::{decode_payload, PayloadMatcher};
use crate::health::state::Thresholds;

#[derive(Debug, Clone)]
pub struct HealthCheckSettings {
    pub timeout: Duration,
    pub interval: Duration,
    pub interval_jitter: Duration,
    pub initial_jitter: Duration,
    pub unhealthy_interval: Option<Duration>,
    pub thresholds: Thresholds,
    pub reuse_connection: bool,
    pub override_policy: OverridePolicy,
    pub checker: ProtocolChecker,
}

impl HealthCheckSettings {
    /// Validate `config`, reporting every problem under `prefix.health_check`.
    pub fn from_config(prefix: &str, config: &HealthCheckConfig) -> Result<Self, Vec<ValidationError>> {
        let base = format!("{prefix}.health_check");
        let mut errors = Vec::new();

        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError::new(format!("{base}.{field}"), ValidationErrorKind::Zero));
            }
        };
        positive("timeout_ms", config.timeout_ms);
        positive("interval_ms", config.interval_ms);
        positive("unhealthy_threshold", u64::from(config.unhealthy_threshold));
        positive("healthy_threshold", u64::from(config.healthy_threshold));
        if let Some(ms) = config.unhealthy_interval_ms {
            positive("unhealthy_interval_ms", ms);
        }

        let checker = build_checker(&base, config, &mut errors);

        match checker {
            Some(checker) if errors.is_empty() => Ok(Self {
                timeout: Duration::from_millis(config.timeout_ms),
                interval: Duration::from_millis(config.interval_ms),
                interval_jitter: Duration::from_millis(config.interval_jitter_ms),
                initial_jitter: Duration::from_millis(config.initial_jitter_ms),
                unhealthy_interval: config.unhealthy_interval_ms.map(Duration::from_millis),
                thresholds: Thresholds {
                    healthy: config.healthy_threshold,
                    unhealthy: config.unhealthy_threshold,
                },
                reuse_connection: config.reuse_connection,
                override_policy: config.override_policy,
                checker,
            }),
            _ => Err(errors),
        }
    }
}

fn build_checker(
    base: &str,
    config: &HealthCheckConfig,
    errors: &mut Vec<ValidationError>,
) -> Option<ProtocolChecker> {
    let configured = [
        config.http.is_some(),
        config.tcp.is_some(),
        config.redis.is_some(),
        config.grpc.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if configured != 1 {
        errors.push(ValidationError::new(base, ValidationErrorKind::CheckerCount(configured)));
        return None;
    }

    if let Some(http) = &config.http {
        let path = format!("{base}.http");
        let before = errors.len();

        if http.path.is_empty() {
            errors.push(ValidationError::new(format!("{path}.path"), ValidationErrorKind::Empty));
        } else if !http.path.starts_with('/') {
            errors.push(ValidationError::new(format!("{path}.path"), ValidationErrorKind::RelativePath));
        }
        if matches!(&http.host, Some(h) if h.is_empty()) {
            errors.push(ValidationError::new(format!("{path}.host"), ValidationErrorKind::Empty));
        }
        for range in &http.expected_statuses {
            if range.start < 100 || range.start >= range.end || range.end > 600 {
                errors.push(ValidationError::new(
                    format!("{path}.expected_statuses"),
                    ValidationErrorKind::StatusRange(range.start, range.end),
                ));
            }
        }
        let send = decode_optional(&format!("{path}.send"), http.send.as_ref(), errors);
        let receive = matcher(&format!("{path}.receive"), http.receive.as_slice(), errors);

        if errors.len() > before {
            return None;
        }
        return Some(ProtocolChecker::Http(HttpChecker::new(
            http.host.clone(),
            http.path.clone(),
            send,
            receive,
            http.service_name.clone(),
            http.expected_statuses.iter().map(|r| r.start..r.end).collect(),
        )));
    }

    if let Some(tcp) = &config.tcp {
        let path = format!("{base}.tcp");
        let before = errors.len();
        let send = decode_optional(&format!("{path}.send"), tcp.send.as_ref(), errors);
        let receive = matcher(&format!("{path}.receive"), &tcp.receive, errors);
        if errors.len() > before {
            return None;
        }
        return Some(ProtocolChecker::Tcp(TcpChecker::new(send, receive)));
    }

    if let Some(redis) = &config.redis {
        if matches!(&redis.key, Some(k) if k.is_empty()) {
            errors.push(ValidationError::new(format!("{base}.redis.key"), ValidationErrorKind::Empty));
            return None;
        }
        return Some(ProtocolChecker::Redis(RedisChecker::new(redis.key.clone())));
    }

    config
        .grpc
        .as_ref()
        .map(|grpc| ProtocolChecker::Grpc(GrpcChecker::new(grpc.service_name.clone())))
}

fn decode_optional(
    path: &str,
    payload: Option<&Payload>,
    errors: &mut Vec<ValidationError>,
) -> Option<Vec<u8>> {
    match payload.map(decode_payload) {
        Some(Ok(bytes)) => Some(bytes),
        Some(Err(e)) => {
            errors.push(ValidationError::new(path, ValidationErrorKind::Payload(e.to_string())));
            None
        }
        None => None,
    }
}

fn matcher(path: &str, payloads: &[Payload], errors: &mut Vec<ValidationError>) -> PayloadMatcher {
    PayloadMatcher::new(payloads).unwrap_or_else(|e| {
        errors.push(ValidationError::new(path, ValidationErrorKind::Payload(e.to_string())));
        PayloadMatcher::default()
    })
}
