//! Registry of per-cluster engines.
//!
//! # Data Flow
//! ```text
//! ClusterConfig list (startup or reload)
//!     → validate every cluster up front (all or nothing)
//!     → removed clusters: engine shut down
//!     → changed health_check: engine torn down and recreated
//!     → unchanged health_check: hosts added / removed in place
//! ```
//!
//! # Design Decisions
//! - A health check config is immutable for an engine's lifetime
//! - Every engine publishes into one registry-wide event channel
//! - Applies are serialized; DashMap guards are never held across awaits

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

use crate::config::schema::{ClusterConfig, HealthCheckConfig};
use crate::config::validation::{validate_hosts, ValidationError, ValidationErrorKind};
use crate::health::engine::{HealthCheckEngine, EVENT_BUFFER};
use crate::health::event::StatusChangeEvent;
use crate::health::host::HostId;
use crate::health::settings::HealthCheckSettings;

struct Cluster {
    config: HealthCheckConfig,
    engine: Arc<HealthCheckEngine>,
}

/// A cluster config that passed validation.
struct Planned<'a> {
    name: &'a str,
    config: &'a HealthCheckConfig,
    settings: HealthCheckSettings,
    hosts: Vec<HostId>,
}

pub struct ClusterRegistry {
    clusters: DashMap<String, Cluster>,
    events: broadcast::Sender<StatusChangeEvent>,
    apply_lock: Mutex<()>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            clusters: DashMap::new(),
            events,
            apply_lock: Mutex::new(()),
        }
    }

    /// Reconcile the running engines with `clusters`.
    ///
    /// Nothing changes when any cluster is invalid.
    pub async fn apply(&self, clusters: &[ClusterConfig]) -> Result<(), Vec<ValidationError>> {
        let plan = plan(clusters)?;
        let _guard = self.apply_lock.lock().await;

        let wanted: HashSet<&str> = plan.iter().map(|p| p.name).collect();
        let stale: Vec<String> = self
            .clusters
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| !wanted.contains(name.as_str()))
            .collect();
        for name in stale {
            if let Some((_, cluster)) = self.clusters.remove(&name) {
                tracing::info!(cluster = %name, "cluster removed");
                cluster.engine.shutdown().await;
            }
        }

        for planned in plan {
            let existing = self
                .clusters
                .get(planned.name)
                .map(|c| (c.config == *planned.config, Arc::clone(&c.engine)));

            match existing {
                Some((true, engine)) => sync_hosts(&engine, &planned.hosts).await,
                Some((false, _)) => {
                    if let Some((_, old)) = self.clusters.remove(planned.name) {
                        tracing::info!(cluster = %planned.name, "health check changed, recreating cluster");
                        old.engine.shutdown().await;
                    }
                    self.create(planned);
                }
                None => {
                    tracing::info!(cluster = %planned.name, "cluster added");
                    self.create(planned);
                }
            }
        }
        Ok(())
    }

    pub fn engine(&self, cluster: &str) -> Option<Arc<HealthCheckEngine>> {
        self.clusters.get(cluster).map(|c| Arc::clone(&c.engine))
    }

    /// Every cluster with its engine, ordered by name.
    pub fn engines(&self) -> Vec<(String, Arc<HealthCheckEngine>)> {
        let mut all: Vec<_> = self
            .clusters
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.engine)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChangeEvent> {
        self.events.subscribe()
    }

    /// Stop every engine.
    pub async fn shutdown(&self) {
        let _guard = self.apply_lock.lock().await;
        let names: Vec<String> = self.clusters.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            if let Some((_, cluster)) = self.clusters.remove(&name) {
                cluster.engine.shutdown().await;
            }
        }
    }

    fn create(&self, planned: Planned<'_>) {
        let engine = HealthCheckEngine::with_events(planned.name, planned.settings, self.events.clone());
        for host in planned.hosts {
            // Hosts were deduplicated during validation.
            let _ = engine.add_host(host);
        }
        self.clusters.insert(
            planned.name.to_string(),
            Cluster {
                config: planned.config.clone(),
                engine: Arc::new(engine),
            },
        );
    }
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn plan(clusters: &[ClusterConfig]) -> Result<Vec<Planned<'_>>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut planned = Vec::with_capacity(clusters.len());
    let mut seen = HashSet::new();

    for (i, cluster) in clusters.iter().enumerate() {
        if cluster.name.is_empty() {
            errors.push(ValidationError::new(format!("clusters[{i}].name"), ValidationErrorKind::Empty));
            continue;
        }
        if !seen.insert(cluster.name.as_str()) {
            errors.push(ValidationError::new(
                format!("clusters[{i}].name"),
                ValidationErrorKind::Duplicate(cluster.name.clone()),
            ));
            continue;
        }

        let prefix = format!("clusters[{}]", cluster.name);
        let settings = HealthCheckSettings::from_config(&prefix, &cluster.health_check);
        let hosts = validate_hosts(&prefix, &cluster.hosts);
        match (settings, hosts) {
            (Ok(settings), Ok(hosts)) => planned.push(Planned {
                name: &cluster.name,
                config: &cluster.health_check,
                settings,
                hosts,
            }),
            (settings, hosts) => {
                errors.extend(settings.err().into_iter().flatten());
                errors.extend(hosts.err().into_iter().flatten());
            }
        }
    }

    if errors.is_empty() {
        Ok(planned)
    } else {
        Err(errors)
    }
}

async fn sync_hosts(engine: &HealthCheckEngine, wanted: &[HostId]) {
    let current: HashSet<HostId> = engine.hosts().into_iter().collect();
    let wanted_set: HashSet<&HostId> = wanted.iter().collect();

    for host in current.iter().filter(|h| !wanted_set.contains(h)) {
        let _ = engine.remove_host(host).await;
    }
    for host in wanted.iter().filter(|h| !current.contains(*h)) {
        let _ = engine.add_host(host.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::HealthStatus;

    fn clusters(raw: &str) -> Vec<ClusterConfig> {
        let config: crate::config::schema::EngineConfig = toml::from_str(raw).unwrap();
        config.clusters
    }

    fn tcp_cluster(name: &str, hosts: &[&str], interval_ms: u64) -> String {
        let hosts: Vec<String> = hosts.iter().map(|h| format!("\"{h}\"")).collect();
        format!(
            r#"
            [[clusters]]
            name = "{name}"
            hosts = [{}]
            [clusters.health_check]
            timeout_ms = 100
            interval_ms = {interval_ms}
            unhealthy_threshold = 1
            healthy_threshold = 1
            [clusters.health_check.tcp]
            "#,
            hosts.join(", ")
        )
    }

    fn host(raw: &str) -> HostId {
        HostId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn creates_and_removes_clusters() {
        let registry = ClusterRegistry::new();
        let both = format!(
            "{}{}",
            tcp_cluster("a", &["127.0.0.1:9001"], 1000),
            tcp_cluster("b", &["127.0.0.1:9002", "127.0.0.1:9003"], 1000)
        );
        registry.apply(&clusters(&both)).await.unwrap();
        let names: Vec<_> = registry.engines().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(registry.engine("b").unwrap().len(), 2);

        registry.apply(&clusters(&tcp_cluster("b", &["127.0.0.1:9002"], 1000))).await.unwrap();
        assert!(registry.engine("a").is_none());
        assert_eq!(registry.engine("b").unwrap().hosts(), [host("127.0.0.1:9002")]);
        registry.shutdown().await;
        assert!(registry.engines().is_empty());
    }

    #[tokio::test]
    async fn unchanged_cluster_keeps_its_engine() {
        let registry = ClusterRegistry::new();
        registry.apply(&clusters(&tcp_cluster("a", &["127.0.0.1:9001"], 1000))).await.unwrap();
        let before = registry.engine("a").unwrap();

        registry
            .apply(&clusters(&tcp_cluster("a", &["127.0.0.1:9001", "127.0.0.1:9002"], 1000)))
            .await
            .unwrap();
        let after = registry.engine("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn changed_health_check_recreates_engine() {
        let registry = ClusterRegistry::new();
        registry.apply(&clusters(&tcp_cluster("a", &["127.0.0.1:9001"], 1000))).await.unwrap();
        let before = registry.engine("a").unwrap();

        registry.apply(&clusters(&tcp_cluster("a", &["127.0.0.1:9001"], 2000))).await.unwrap();
        let after = registry.engine("a").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.is_empty());
        assert_eq!(after.current_status(&host("127.0.0.1:9001")), Ok(HealthStatus::Unknown));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_changes_nothing() {
        let registry = ClusterRegistry::new();
        registry.apply(&clusters(&tcp_cluster("a", &["127.0.0.1:9001"], 1000))).await.unwrap();

        let broken = format!(
            "{}{}",
            tcp_cluster("b", &["127.0.0.1:9002"], 1000),
            tcp_cluster("c", &["no-port"], 0)
        );
        let errors = registry.apply(&clusters(&broken)).await.unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(registry.engine("a").is_some());
        assert!(registry.engine("b").is_none());
        registry.shutdown().await;
    }
}
