//! Health Check Server - Liveness, Readiness and Metrics
//!
//! Exposes /live, /ready and /metrics via axum 0.7. Readiness follows
//! the session: without a token no feed can stay fresh.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use super::prometheus::SyncMetrics;
use crate::domain::SessionStore;

/// Shared state read by the health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process-wide session.
    pub session: SessionStore,
    /// Metrics rendered on /metrics.
    pub metrics: Arc<SyncMetrics>,
}

impl HealthState {
    /// Bundle the session and metrics for the health endpoints.
    pub const fn new(session: SessionStore, metrics: Arc<SyncMetrics>) -> Self {
        Self { session, metrics }
    }

    /// Ready while a session exists.
    pub fn is_ready(&self) -> bool {
        self.session.is_active()
    }
}

/// Axum-based health and metrics HTTP server.
pub struct HealthServer {
    state: HealthState,
    bind_address: String,
}

impl HealthServer {
    /// Create a new health server.
    pub const fn new(state: HealthState, bind_address: String) -> Self {
        Self { state, bind_address }
    }

    /// Routes served by this server.
    pub fn router(state: HealthState) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/metrics", get(Self::metrics))
            .with_state(state)
    }

    /// Serve until the shutdown signal fires.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness check: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness check: 200 only while a session is live.
    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
        state.metrics.render()
    }
}
