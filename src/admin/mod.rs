//! Admin API.
//!
//! # Responsibilities
//! - Pull interface: cluster, host and overall status
//! - Operator overrides (DRAINING / TIMEOUT)
//! - Push interface: server-sent status change events
//!
//! # Design Decisions
//! - Every route requires `Authorization: Bearer <api_key>`
//! - Reads come from published snapshots, never from scheduler state

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::health::ClusterRegistry;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ClusterRegistry>,
    pub api_key: Arc<str>,
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/clusters", get(get_clusters))
        .route("/admin/clusters/{cluster}/hosts/{host}", get(get_host))
        .route("/admin/clusters/{cluster}/hosts/{host}/override", put(put_override))
        .route("/admin/events", get(stream_events))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
