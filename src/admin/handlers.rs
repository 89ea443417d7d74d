use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

use crate::admin::AdminState;
use crate::health::host::{HostId, InvalidHostId};
use crate::health::{EngineError, HealthCheckEngine, HealthStatus, HostSnapshot, Override};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub clusters: usize,
    pub hosts: usize,
}

#[derive(Serialize)]
pub struct ClusterStatus {
    pub name: String,
    pub protocol: &'static str,
    pub hosts: Vec<HostSnapshot>,
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    #[serde(rename = "override")]
    pub value: Option<Override>,
}

#[derive(Serialize)]
pub struct OverrideResponse {
    pub host: HostId,
    pub status: HealthStatus,
}

/// Admin API failures, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error(transparent)]
    InvalidHost(#[from] InvalidHostId),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::UnknownCluster(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidHost(_) => StatusCode::BAD_REQUEST,
            AdminError::Engine(EngineError::NotMonitored(_)) => StatusCode::NOT_FOUND,
            AdminError::Engine(EngineError::AlreadyMonitored(_)) => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn resolve(
    state: &AdminState,
    cluster: &str,
    host: &str,
) -> Result<(std::sync::Arc<HealthCheckEngine>, HostId), AdminError> {
    let engine = state
        .registry
        .engine(cluster)
        .ok_or_else(|| AdminError::UnknownCluster(cluster.to_string()))?;
    Ok((engine, HostId::parse(host)?))
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let engines = state.registry.engines();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        clusters: engines.len(),
        hosts: engines.iter().map(|(_, engine)| engine.len()).sum(),
    })
}

pub async fn get_clusters(State(state): State<AdminState>) -> Json<Vec<ClusterStatus>> {
    let clusters = state
        .registry
        .engines()
        .into_iter()
        .map(|(name, engine)| ClusterStatus {
            name,
            protocol: engine.settings().checker.protocol(),
            hosts: engine.snapshots(),
        })
        .collect();
    Json(clusters)
}

pub async fn get_host(
    State(state): State<AdminState>,
    Path((cluster, host)): Path<(String, String)>,
) -> Result<Json<HostSnapshot>, AdminError> {
    let (engine, host) = resolve(&state, &cluster, &host)?;
    Ok(Json(engine.snapshot(&host)?))
}

pub async fn put_override(
    State(state): State<AdminState>,
    Path((cluster, host)): Path<(String, String)>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<OverrideResponse>, AdminError> {
    let (engine, host) = resolve(&state, &cluster, &host)?;
    let status = engine.set_override(&host, request.value).await?;
    tracing::info!(cluster = %cluster, host = %host, status = %status, "Override set via admin API");
    Ok(Json(OverrideResponse { host, status }))
}

/// Server-sent events stream of every status change in the registry.
pub async fn stream_events(
    State(state): State<AdminState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = state.registry.subscribe();

    let stream = stream::unfold(events, |mut events| async move {
        loop {
            match events.recv().await {
                Ok(change) => {
                    let event = Event::default()
                        .event("status_change")
                        .id(change.id.to_string())
                        .json_data(&change);
                    return Some((event, events));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Admin event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
