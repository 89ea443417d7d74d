//! Host health state machine.
//!
//! # States
//! - Unknown: host just added, no probe result yet
//! - Healthy: host receives traffic
//! - Unhealthy: host excluded from load balancing
//! - Draining / Timeout: operator overrides, never derived from probes
//!
//! # State Transitions
//! ```text
//! Unknown   → Healthy:   first success
//! *         → Unhealthy: consecutive failures >= unhealthy_threshold
//! *         → Unhealthy: hard failure (immediate)
//! Unhealthy → Healthy:   consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Counters reset on every transition; at most one is non-zero
//! - Overrides sit in their own slot and win when publishing, subject to
//!   the configured `OverridePolicy`
//! - Probe results keep updating the underlying status while overridden

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::schema::OverridePolicy;
use crate::health::checker::OutcomeKind;

/// Published health of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
    Draining,
    Timeout,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 5] = [
        HealthStatus::Unknown,
        HealthStatus::Healthy,
        HealthStatus::Unhealthy,
        HealthStatus::Draining,
        HealthStatus::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Unhealthy => "UNHEALTHY",
            HealthStatus::Draining => "DRAINING",
            HealthStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally injected status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    Draining,
    Timeout,
}

impl From<Override> for HealthStatus {
    fn from(value: Override) -> Self {
        match value {
            Override::Draining => HealthStatus::Draining,
            Override::Timeout => HealthStatus::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Consecutive successes to leave Unhealthy.
    pub healthy: u32,
    /// Consecutive failures to become Unhealthy.
    pub unhealthy: u32,
}

/// A change of the published status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub at: SystemTime,
}

/// Health of a single host.
#[derive(Debug, Clone)]
pub struct HostHealthState {
    /// Probe-derived status: Unknown, Healthy or Unhealthy.
    probe_status: HealthStatus,
    override_status: Option<Override>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    last_transition: SystemTime,
    thresholds: Thresholds,
    policy: OverridePolicy,
}

impl HostHealthState {
    pub fn new(thresholds: Thresholds, policy: OverridePolicy) -> Self {
        Self {
            probe_status: HealthStatus::Unknown,
            override_status: None,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_transition: SystemTime::now(),
            thresholds,
            policy,
        }
    }

    /// The status consumers should act on.
    pub fn status(&self) -> HealthStatus {
        self.override_status
            .map(HealthStatus::from)
            .unwrap_or(self.probe_status)
    }

    /// The status probes alone would publish.
    pub fn probe_status(&self) -> HealthStatus {
        self.probe_status
    }

    pub fn override_status(&self) -> Option<Override> {
        self.override_status
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_transition(&self) -> SystemTime {
        self.last_transition
    }

    /// Apply a probe outcome observed now.
    pub fn record(&mut self, outcome: OutcomeKind) -> Option<Transition> {
        self.record_at(outcome, SystemTime::now())
    }

    /// Apply a probe outcome; returns the published transition, if any.
    pub fn record_at(&mut self, outcome: OutcomeKind, now: SystemTime) -> Option<Transition> {
        let before = self.status();

        match outcome {
            OutcomeKind::HardFailure => {
                if self.policy.demotes_on_hard_failure() {
                    self.override_status = None;
                }
                self.move_to(HealthStatus::Unhealthy);
            }
            OutcomeKind::Failure | OutcomeKind::TransportError => {
                self.consecutive_successes = 0;
                // While overridden failures keep counting, so a demoting
                // policy can still act on an already-unhealthy host.
                if self.probe_status != HealthStatus::Unhealthy || self.override_status.is_some() {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.thresholds.unhealthy {
                        if self.policy.demotes_on_failure() {
                            self.override_status = None;
                        }
                        self.move_to(HealthStatus::Unhealthy);
                    }
                }
            }
            OutcomeKind::Success => {
                self.consecutive_failures = 0;
                match self.probe_status {
                    HealthStatus::Unknown => self.move_to(HealthStatus::Healthy),
                    HealthStatus::Unhealthy => {
                        self.consecutive_successes += 1;
                        if self.consecutive_successes >= self.thresholds.healthy {
                            self.move_to(HealthStatus::Healthy);
                        }
                    }
                    _ => {}
                }
            }
        }

        self.published(before, now)
    }

    /// Set or clear the override slot.
    pub fn set_override(&mut self, value: Option<Override>) -> Option<Transition> {
        self.set_override_at(value, SystemTime::now())
    }

    pub fn set_override_at(&mut self, value: Option<Override>, now: SystemTime) -> Option<Transition> {
        let before = self.status();
        self.override_status = value;
        self.consecutive_successes = 0;
        self.consecutive_failures = 0;
        self.published(before, now)
    }

    fn move_to(&mut self, status: HealthStatus) {
        self.probe_status = status;
        self.consecutive_successes = 0;
        self.consecutive_failures = 0;
    }

    fn published(&mut self, before: HealthStatus, now: SystemTime) -> Option<Transition> {
        let after = self.status();
        if after == before {
            return None;
        }
        self.last_transition = now;
        Some(Transition {
            from: before,
            to: after,
            at: now,
        })
    }
}
