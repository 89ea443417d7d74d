//! Per-host probe loop.
//!
//! # Responsibilities
//! - Wake every `interval + uniform[0, interval_jitter]`
//! - Acquire or reuse a session and run one probe under the `timeout` deadline
//! - Feed each outcome into the host's `HostHealthState`
//! - Publish a `HostSnapshot` for readers and emit status change events
//!
//! # Design Decisions
//! - One task per host; probes of one host are strictly sequential
//! - The state machine is owned by the task, readers only see snapshots
//! - Override commands are applied even while a probe is in flight
//! - Stopping drops the in-flight probe and its session immediately

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::health::checker::{Checker, Outcome, OutcomeKind, TransportError};
use crate::health::event::{unix_millis, StatusChangeEvent};
use crate::health::host::HostId;
use crate::health::settings::HealthCheckSettings;
use crate::health::state::{HealthStatus, HostHealthState, Override, Transition};
use crate::observability::metrics;

/// Point-in-time view of one host, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSnapshot {
    pub host: HostId,
    pub status: HealthStatus,
    pub probe_status: HealthStatus,
    #[serde(rename = "override")]
    pub override_status: Option<Override>,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_transition_ms: u64,
    pub last_outcome: Option<OutcomeKind>,
    pub probes: u64,
}

impl HostSnapshot {
    fn capture(host: &HostId, state: &HostHealthState, last_outcome: Option<OutcomeKind>, probes: u64) -> Self {
        Self {
            host: host.clone(),
            status: state.status(),
            probe_status: state.probe_status(),
            override_status: state.override_status(),
            consecutive_successes: state.consecutive_successes(),
            consecutive_failures: state.consecutive_failures(),
            last_transition_ms: unix_millis(state.last_transition()),
            last_outcome,
            probes,
        }
    }
}

/// Requests sent to a running scheduler.
#[derive(Debug)]
pub enum Command {
    /// Set or clear the override; replies with the resulting published status.
    SetOverride(Option<Override>, oneshot::Sender<HealthStatus>),
}

/// Everything about a host except its checker and session.
struct HostCore {
    cluster: Arc<str>,
    host: HostId,
    protocol: &'static str,
    state: HostHealthState,
    snapshot: Arc<ArcSwap<HostSnapshot>>,
    events: broadcast::Sender<StatusChangeEvent>,
    last_outcome: Option<OutcomeKind>,
    probes: u64,
}

impl HostCore {
    fn record(&mut self, outcome: &Outcome, elapsed: Duration) {
        let kind = outcome.kind();
        self.probes += 1;
        self.last_outcome = Some(kind);
        metrics::record_probe(&self.cluster, self.protocol, kind, elapsed);

        match outcome {
            Outcome::Success => tracing::trace!("probe succeeded"),
            Outcome::Failure(reason) => tracing::debug!(reason = %reason, "probe failed"),
            Outcome::HardFailure(reason) => tracing::warn!(reason = %reason, "probe reported hard failure"),
            Outcome::TransportError(e) => tracing::debug!(error = %e, "probe transport error"),
        }

        let transition = self.state.record(kind);
        self.publish(transition);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetOverride(value, reply) => {
                tracing::info!(override_status = ?value, "override updated");
                let transition = self.state.set_override(value);
                self.publish(transition);
                let _ = reply.send(self.state.status());
            }
        }
    }

    /// Snapshot first, so subscribers reacting to an event read fresh state.
    fn publish(&mut self, transition: Option<Transition>) {
        self.snapshot.store(Arc::new(HostSnapshot::capture(
            &self.host,
            &self.state,
            self.last_outcome,
            self.probes,
        )));

        if let Some(t) = transition {
            tracing::info!(from = %t.from, to = %t.to, "host status changed");
            metrics::record_transition(&self.cluster, t.from, t.to);
            metrics::record_host_status(&self.cluster, &self.host, t.to);
            let _ = self
                .events
                .send(StatusChangeEvent::new(self.cluster.clone(), self.host.clone(), t));
        }
    }
}

/// Drives the probes of a single host.
pub struct ProbeScheduler<C: Checker> {
    core: HostCore,
    checker: Arc<C>,
    session: Option<C::Session>,
    settings: Arc<HealthCheckSettings>,
    commands: mpsc::Receiver<Command>,
}

impl<C: Checker> ProbeScheduler<C> {
    pub fn new(
        cluster: Arc<str>,
        host: HostId,
        checker: Arc<C>,
        settings: Arc<HealthCheckSettings>,
        events: broadcast::Sender<StatusChangeEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let state = HostHealthState::new(settings.thresholds, settings.override_policy);
        let snapshot = Arc::new(ArcSwap::from_pointee(HostSnapshot::capture(&host, &state, None, 0)));

        Self {
            core: HostCore {
                cluster,
                host,
                protocol: checker.protocol(),
                state,
                snapshot,
                events,
                last_outcome: None,
                probes: 0,
            },
            checker,
            session: None,
            settings,
            commands,
        }
    }

    /// Shared handle on the published snapshot.
    pub fn snapshot(&self) -> Arc<ArcSwap<HostSnapshot>> {
        Arc::clone(&self.core.snapshot)
    }

    /// Run until `stop` fires or its sender is dropped.
    pub async fn run(self, stop: broadcast::Receiver<()>) {
        let span = tracing::info_span!(
            "host",
            cluster = %self.core.cluster,
            host = %self.core.host,
        );
        self.run_loop(stop).instrument(span).await
    }

    async fn run_loop(mut self, mut stop: broadcast::Receiver<()>) {
        tracing::debug!(protocol = self.core.protocol, "probe scheduler started");
        metrics::record_host_status(&self.core.cluster, &self.core.host, HealthStatus::Unknown);

        let first = next_delay(Duration::ZERO, self.settings.initial_jitter, &mut rand::thread_rng());
        let mut next_at = Instant::now() + first;

        'run: loop {
            tokio::select! {
                _ = stop.recv() => break 'run,
                Some(command) = self.commands.recv() => {
                    self.core.apply(command);
                    continue 'run;
                }
                _ = time::sleep_until(next_at) => {}
            }

            let host = self.core.host.clone();
            let started = Instant::now();
            let probe = probe_once(
                &*self.checker,
                &host,
                &mut self.session,
                self.settings.timeout,
                self.settings.reuse_connection,
            );
            tokio::pin!(probe);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut probe => break outcome,
                    _ = stop.recv() => break 'run,
                    Some(command) = self.commands.recv() => self.core.apply(command),
                }
            };

            self.core.record(&outcome, started.elapsed());

            let base = match self.core.state.probe_status() {
                HealthStatus::Unhealthy => self.settings.unhealthy_interval.unwrap_or(self.settings.interval),
                _ => self.settings.interval,
            };
            next_at = Instant::now() + next_delay(base, self.settings.interval_jitter, &mut rand::thread_rng());
        }

        self.session = None;
        metrics::clear_host_status(&self.core.cluster, &self.core.host);
        tracing::debug!("probe scheduler stopped");
    }
}

/// One probe bounded by `timeout`.
///
/// The held session is reused when the checker allows it; it is kept for the
/// next probe only if `reuse` is set and the exchange did not break down.
pub(crate) async fn probe_once<C: Checker>(
    checker: &C,
    host: &HostId,
    session: &mut Option<C::Session>,
    timeout: Duration,
    reuse: bool,
) -> Outcome {
    let held = session.take().filter(|s| checker.is_reusable(s));
    let deadline = Instant::now() + timeout;

    let exchange = async move {
        let mut current = match held {
            Some(current) => current,
            None => match checker.connect(host).await {
                Ok(current) => current,
                Err(e) => return (Outcome::TransportError(e), None),
            },
        };
        let outcome = checker.probe(host, &mut current, deadline).await;
        (outcome, Some(current))
    };

    match time::timeout_at(deadline, exchange).await {
        Ok((outcome, current)) => {
            if reuse && !matches!(outcome, Outcome::TransportError(_)) {
                *session = current;
            }
            outcome
        }
        Err(_) => Outcome::TransportError(TransportError::Timeout(timeout)),
    }
}

/// `base` plus a uniformly random offset in `[0, jitter]`, millisecond granularity.
pub fn next_delay<R: Rng + ?Sized>(base: Duration, jitter: Duration, rng: &mut R) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rng.gen_range(0..=jitter_ms))
}
