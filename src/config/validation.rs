//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0, status ranges)
//! - Check that exactly one protocol is configured per cluster
//! - Decode payloads and host authorities
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::EngineConfig;
use crate::health::host::HostId;
use crate::health::settings::HealthCheckSettings;

/// A single semantic problem, located by a dotted config path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {kind}")]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: impl fmt::Display, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("must be greater than zero")]
    Zero,

    #[error("must not be empty")]
    Empty,

    #[error("exactly one of http, tcp, redis or grpc must be set, found {0}")]
    CheckerCount(usize),

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Host(String),

    #[error("duplicate entry '{0}'")]
    Duplicate(String),

    #[error("invalid status range [{0}, {1})")]
    StatusRange(u16, u16),

    #[error("must start with '/'")]
    RelativePath,

    #[error("invalid socket address '{0}'")]
    Address(String),
}

/// Validate a whole engine configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "admin.bind_address",
            ValidationErrorKind::Address(config.admin.bind_address.clone()),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            ValidationErrorKind::Address(config.observability.metrics_address.clone()),
        ));
    }

    let mut names = HashSet::new();
    for (i, cluster) in config.clusters.iter().enumerate() {
        if cluster.name.is_empty() {
            errors.push(ValidationError::new(
                format!("clusters[{i}].name"),
                ValidationErrorKind::Empty,
            ));
        } else if !names.insert(cluster.name.as_str()) {
            errors.push(ValidationError::new(
                format!("clusters[{i}].name"),
                ValidationErrorKind::Duplicate(cluster.name.clone()),
            ));
        }

        let prefix = format!("clusters[{}]", cluster.name);
        if let Err(mut e) = validate_hosts(&prefix, &cluster.hosts) {
            errors.append(&mut e);
        }
        if let Err(mut e) = HealthCheckSettings::from_config(&prefix, &cluster.health_check) {
            errors.append(&mut e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse every host of a cluster, rejecting malformed and duplicate entries.
pub fn validate_hosts(prefix: &str, hosts: &[String]) -> Result<Vec<HostId>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut parsed = Vec::with_capacity(hosts.len());
    let mut seen = HashSet::new();

    for (i, raw) in hosts.iter().enumerate() {
        let path = format!("{prefix}.hosts[{i}]");
        match HostId::parse(raw) {
            Ok(host) => {
                if seen.insert(host.clone()) {
                    parsed.push(host);
                } else {
                    errors.push(ValidationError::new(path, ValidationErrorKind::Duplicate(raw.clone())));
                }
            }
            Err(e) => errors.push(ValidationError::new(path, ValidationErrorKind::Host(e.to_string()))),
        }
    }

    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> EngineConfig {
        toml::from_str(raw).unwrap()
    }

    const VALID: &str = r#"
        [[clusters]]
        name = "api"
        hosts = ["127.0.0.1:8080", "127.0.0.1:8081"]
        [clusters.health_check]
        timeout_ms = 1000
        interval_ms = 2000
        unhealthy_threshold = 2
        healthy_threshold = 2
        [clusters.health_check.http]
        path = "/health"
    "#;

    #[test]
    fn accepts_valid_config() {
        assert_eq!(validate_config(&parse(VALID)), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let config = parse(
            r#"
            [observability]
            metrics_address = "not-an-address"

            [[clusters]]
            name = "api"
            hosts = ["127.0.0.1", "127.0.0.1:80", "127.0.0.1:80"]
            [clusters.health_check]
            timeout_ms = 0
            interval_ms = 1000
            unhealthy_threshold = 0
            healthy_threshold = 1
            [clusters.health_check.http]
            path = ""
            send = { text = "" }
        "#,
        );

        let errors = validate_config(&config).unwrap_err();
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"observability.metrics_address"));
        assert!(paths.contains(&"clusters[api].hosts[0]"));
        assert!(paths.contains(&"clusters[api].hosts[2]"));
        assert!(paths.contains(&"clusters[api].health_check.timeout_ms"));
        assert!(paths.contains(&"clusters[api].health_check.unhealthy_threshold"));
        assert!(paths.contains(&"clusters[api].health_check.http.path"));
        assert!(paths.contains(&"clusters[api].health_check.http.send"));
    }

    #[test]
    fn rejects_duplicate_cluster_names() {
        let doubled = format!("{VALID}\n{VALID}");
        let errors = validate_config(&parse(&doubled)).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::Duplicate("api".into()));
    }

    #[test]
    fn error_message_includes_path() {
        let err = ValidationError::new("clusters[api].health_check.interval_ms", ValidationErrorKind::Zero);
        assert_eq!(err.to_string(), "clusters[api].health_check.interval_ms: must be greater than zero");
    }
}
