//! Health check engine for one cluster.
//!
//! # Responsibilities
//! - Own one `ProbeScheduler` task per monitored host
//! - Add and remove hosts at runtime
//! - Answer status queries from published snapshots
//! - Forward operator overrides to the owning scheduler
//! - Fan status change events out to subscribers
//!
//! # Design Decisions
//! - The host set lives in a `DashMap`; no lock is held across an await
//! - Host state dies with its task, a re-added host starts UNKNOWN
//! - Dropping the engine stops every scheduler (their stop senders drop)

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use crate::health::checker::{Checker, ProtocolChecker};
use crate::health::event::StatusChangeEvent;
use crate::health::host::HostId;
use crate::health::scheduler::{Command, HostSnapshot, ProbeScheduler};
use crate::health::settings::HealthCheckSettings;
use crate::health::state::{HealthStatus, Override};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Capacity of the status change channel created by `HealthCheckEngine::new`.
pub const EVENT_BUFFER: usize = 1024;

const COMMAND_BUFFER: usize = 8;

/// Benign membership errors; callers may ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("host {0} is already monitored")]
    AlreadyMonitored(HostId),

    #[error("host {0} is not monitored")]
    NotMonitored(HostId),
}

struct HostHandle {
    cluster: Arc<str>,
    host: HostId,
    snapshot: Arc<ArcSwap<HostSnapshot>>,
    commands: mpsc::Sender<Command>,
    stop: Shutdown,
    task: JoinHandle<()>,
}

impl HostHandle {
    /// Stop the scheduler, waiting at most `grace` before aborting it.
    async fn stop(mut self, grace: Duration) {
        self.stop.trigger();
        if time::timeout(grace, &mut self.task).await.is_err() {
            tracing::warn!(cluster = %self.cluster, host = %self.host, "probe scheduler did not stop in time, aborting");
            self.task.abort();
            // An aborted scheduler never reaches its own cleanup.
            metrics::clear_host_status(&self.cluster, &self.host);
        }
    }
}

pub struct HealthCheckEngine {
    cluster: Arc<str>,
    settings: Arc<HealthCheckSettings>,
    hosts: DashMap<HostId, HostHandle>,
    events: broadcast::Sender<StatusChangeEvent>,
}

impl HealthCheckEngine {
    pub fn new(cluster: impl Into<Arc<str>>, settings: HealthCheckSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self::with_events(cluster, settings, events)
    }

    /// Create an engine publishing into an existing event channel.
    pub fn with_events(
        cluster: impl Into<Arc<str>>,
        settings: HealthCheckSettings,
        events: broadcast::Sender<StatusChangeEvent>,
    ) -> Self {
        let cluster = cluster.into();
        tracing::info!(
            cluster = %cluster,
            protocol = settings.checker.protocol(),
            "health check engine created"
        );
        Self {
            cluster,
            settings: Arc::new(settings),
            hosts: DashMap::new(),
            events,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn settings(&self) -> &HealthCheckSettings {
        &self.settings
    }

    /// Start monitoring `host` from UNKNOWN. Must be called within a tokio runtime.
    pub fn add_host(&self, host: HostId) -> Result<(), EngineError> {
        match self.hosts.entry(host) {
            Entry::Occupied(entry) => return Err(EngineError::AlreadyMonitored(entry.key().clone())),
            Entry::Vacant(entry) => {
                let handle = self.spawn(entry.key().clone());
                entry.insert(handle);
            }
        }
        self.publish_host_count();
        Ok(())
    }

    /// Stop monitoring `host`, cancelling any in-flight probe and discarding its state.
    pub async fn remove_host(&self, host: &HostId) -> Result<(), EngineError> {
        let (_, handle) = self
            .hosts
            .remove(host)
            .ok_or_else(|| EngineError::NotMonitored(host.clone()))?;
        self.publish_host_count();
        handle.stop(self.settings.timeout).await;
        tracing::info!(cluster = %self.cluster, host = %host, "host removed");
        Ok(())
    }

    pub fn current_status(&self, host: &HostId) -> Result<HealthStatus, EngineError> {
        self.snapshot(host).map(|s| s.status)
    }

    pub fn snapshot(&self, host: &HostId) -> Result<HostSnapshot, EngineError> {
        self.hosts
            .get(host)
            .map(|handle| HostSnapshot::clone(&handle.snapshot.load()))
            .ok_or_else(|| EngineError::NotMonitored(host.clone()))
    }

    /// Snapshots of every host, ordered by host.
    pub fn snapshots(&self) -> Vec<HostSnapshot> {
        let mut all: Vec<_> = self
            .hosts
            .iter()
            .map(|entry| HostSnapshot::clone(&entry.snapshot.load()))
            .collect();
        all.sort_by(|a, b| a.host.cmp(&b.host));
        all
    }

    pub fn hosts(&self) -> Vec<HostId> {
        let mut hosts: Vec<_> = self.hosts.iter().map(|entry| entry.key().clone()).collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Set (`Some`) or clear (`None`) an override; returns the published status.
    pub async fn set_override(
        &self,
        host: &HostId,
        value: Option<Override>,
    ) -> Result<HealthStatus, EngineError> {
        let not_monitored = || EngineError::NotMonitored(host.clone());
        let commands = self
            .hosts
            .get(host)
            .map(|handle| handle.commands.clone())
            .ok_or_else(not_monitored)?;

        let (reply, status) = oneshot::channel();
        commands
            .send(Command::SetOverride(value, reply))
            .await
            .map_err(|_| not_monitored())?;
        status.await.map_err(|_| not_monitored())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChangeEvent> {
        self.events.subscribe()
    }

    /// Stop every scheduler and forget all hosts.
    pub async fn shutdown(&self) {
        let hosts = self.hosts();
        let handles: Vec<_> = hosts
            .iter()
            .filter_map(|host| self.hosts.remove(host).map(|(_, handle)| handle))
            .collect();
        self.publish_host_count();

        let grace = self.settings.timeout;
        join_all(handles.into_iter().map(|handle| handle.stop(grace))).await;
        tracing::info!(cluster = %self.cluster, hosts = hosts.len(), "health check engine stopped");
    }

    fn spawn(&self, host: HostId) -> HostHandle {
        tracing::info!(cluster = %self.cluster, host = %host, "host added");
        match &self.settings.checker {
            ProtocolChecker::Http(checker) => self.start(host, Arc::new(checker.clone())),
            ProtocolChecker::Tcp(checker) => self.start(host, Arc::new(checker.clone())),
            ProtocolChecker::Redis(checker) => self.start(host, Arc::new(checker.clone())),
            ProtocolChecker::Grpc(checker) => self.start(host, Arc::new(checker.clone())),
        }
    }

    fn start<C: Checker>(&self, host: HostId, checker: Arc<C>) -> HostHandle {
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let stop = Shutdown::new();
        let scheduler = ProbeScheduler::new(
            Arc::clone(&self.cluster),
            host.clone(),
            checker,
            Arc::clone(&self.settings),
            self.events.clone(),
            commands_rx,
        );
        let snapshot = scheduler.snapshot();
        let task = tokio::spawn(scheduler.run(stop.subscribe()));

        HostHandle {
            cluster: Arc::clone(&self.cluster),
            host,
            snapshot,
            commands,
            stop,
            task,
        }
    }

    fn publish_host_count(&self) {
        metrics::set_monitored_hosts(&self.cluster, self.hosts.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OverridePolicy;
    use crate::health::checker::TcpChecker;
    use crate::health::matcher::PayloadMatcher;
    use crate::health::state::Thresholds;
    use tokio::net::TcpListener;

    fn tcp_settings() -> HealthCheckSettings {
        HealthCheckSettings {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(50),
            interval_jitter: Duration::from_millis(10),
            initial_jitter: Duration::ZERO,
            unhealthy_interval: None,
            thresholds: Thresholds { healthy: 1, unhealthy: 1 },
            reuse_connection: false,
            override_policy: OverridePolicy::HardFailureDemotes,
            checker: ProtocolChecker::Tcp(TcpChecker::new(None, PayloadMatcher::default())),
        }
    }

    async fn listening_host() -> (TcpListener, HostId) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = HostId::parse(&listener.local_addr().unwrap().to_string()).unwrap();
        (listener, host)
    }

    async fn next_status(events: &mut broadcast::Receiver<StatusChangeEvent>) -> HealthStatus {
        time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no status change")
            .unwrap()
            .to
    }

    #[tokio::test]
    async fn membership_errors_are_benign() {
        let engine = HealthCheckEngine::new("c", tcp_settings());
        let host = HostId::parse("127.0.0.1:9").unwrap();

        assert_eq!(engine.remove_host(&host).await, Err(EngineError::NotMonitored(host.clone())));
        assert_eq!(engine.current_status(&host), Err(EngineError::NotMonitored(host.clone())));

        engine.add_host(host.clone()).unwrap();
        assert_eq!(engine.add_host(host.clone()), Err(EngineError::AlreadyMonitored(host.clone())));
        assert_eq!(engine.len(), 1);
        engine.shutdown().await;
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn connect_only_host_becomes_healthy() {
        let (_listener, host) = listening_host().await;
        let engine = HealthCheckEngine::new("c", tcp_settings());
        let mut events = engine.subscribe();

        engine.add_host(host.clone()).unwrap();
        assert_eq!(engine.current_status(&host), Ok(HealthStatus::Unknown));
        assert_eq!(next_status(&mut events).await, HealthStatus::Healthy);
        assert_eq!(engine.current_status(&host), Ok(HealthStatus::Healthy));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn readding_a_host_starts_from_unknown() {
        let (_listener, host) = listening_host().await;
        let engine = HealthCheckEngine::new("c", tcp_settings());
        let mut events = engine.subscribe();

        engine.add_host(host.clone()).unwrap();
        assert_eq!(next_status(&mut events).await, HealthStatus::Healthy);

        engine.remove_host(&host).await.unwrap();
        engine.add_host(host.clone()).unwrap();
        let snapshot = engine.snapshot(&host).unwrap();
        assert_eq!(snapshot.status, HealthStatus::Unknown);
        assert_eq!(snapshot.probes, 0);
        assert_eq!(snapshot.consecutive_failures, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn refused_host_becomes_unhealthy() {
        let (listener, host) = listening_host().await;
        drop(listener);
        let engine = HealthCheckEngine::new("c", tcp_settings());
        let mut events = engine.subscribe();

        engine.add_host(host.clone()).unwrap();
        assert_eq!(next_status(&mut events).await, HealthStatus::Unhealthy);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn overrides_are_applied_and_cleared() {
        let (_listener, host) = listening_host().await;
        let engine = HealthCheckEngine::new("c", tcp_settings());
        let mut events = engine.subscribe();
        engine.add_host(host.clone()).unwrap();
        assert_eq!(next_status(&mut events).await, HealthStatus::Healthy);

        let status = engine.set_override(&host, Some(Override::Draining)).await.unwrap();
        assert_eq!(status, HealthStatus::Draining);
        assert_eq!(engine.current_status(&host), Ok(HealthStatus::Draining));

        let status = engine.set_override(&host, None).await.unwrap();
        assert_eq!(status, HealthStatus::Healthy);

        let other = HostId::parse("127.0.0.1:9").unwrap();
        assert_eq!(
            engine.set_override(&other, Some(Override::Timeout)).await,
            Err(EngineError::NotMonitored(other.clone()))
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn aborted_schedulers_clear_their_status_series() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let render = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let host = HostId::parse("127.0.0.1:9").unwrap();
        metrics::record_host_status("c", &host, HealthStatus::Healthy);

        // A task that ignores its stop signal.
        let handle = HostHandle {
            cluster: Arc::from("c"),
            host: host.clone(),
            snapshot: Arc::new(ArcSwap::from_pointee(HostSnapshot {
                host: host.clone(),
                status: HealthStatus::Healthy,
                probe_status: HealthStatus::Healthy,
                override_status: None,
                consecutive_successes: 0,
                consecutive_failures: 0,
                last_transition_ms: 0,
                last_outcome: None,
                probes: 1,
            })),
            commands: mpsc::channel(1).0,
            stop: Shutdown::new(),
            task: tokio::spawn(std::future::pending()),
        };
        handle.stop(Duration::from_millis(20)).await;

        let rendered = render.render();
        let healthy = rendered
            .lines()
            .find(|line| line.starts_with("health_host_status") && line.contains(r#"status="HEALTHY""#))
            .expect("series recorded");
        assert!(healthy.ends_with(" 0"), "{healthy}");
    }

    #[tokio::test]
    async fn snapshots_are_sorted_by_host() {
        let engine = HealthCheckEngine::new("c", tcp_settings());
        for port in [9003, 9001, 9002] {
            engine.add_host(HostId::parse(&format!("127.0.0.1:{port}")).unwrap()).unwrap();
        }
        let hosts: Vec<_> = engine.snapshots().into_iter().map(|s| s.host.to_string()).collect();
        assert_eq!(hosts, ["127.0.0.1:9001", "127.0.0.1:9002", "127.0.0.1:9003"]);
        engine.shutdown().await;
    }
}
