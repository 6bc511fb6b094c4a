//! Server setup and shared application state

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::adapters::EngineSet;
use crate::config::AppConfig;
use crate::streaming::session;

/// Shared application state for the HTTP server.
pub struct AppState {
    engines: EngineSet,
    config: AppConfig,
    is_ready: AtomicBool,
    connections: AtomicUsize,
}

impl AppState {
    /// Create a new application state with readiness unset.
    pub fn new(engines: EngineSet, config: AppConfig) -> Self {
        Self {
            engines,
            config,
            is_ready: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
        }
    }

    /// Mark the server as ready to accept sessions.
    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::SeqCst);
    }

    /// Track a new WebSocket connection and return the total.
    pub fn connection_opened(&self) -> usize {
        let total = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("simulvox_active_sessions", total as f64);
        total
    }

    /// Track a closed WebSocket connection and return the remaining total.
    pub fn connection_closed(&self) -> usize {
        let remaining = self
            .connections
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        gauge!("simulvox_active_sessions", remaining as f64);
        remaining
    }

    pub fn engines(&self) -> EngineSet {
        self.engines.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Build the HTTP router for the service.
pub fn build_router(state: Arc<AppState>, recorder_handle: PrometheusHandle) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = recorder_handle.clone();
                async move { handle.render() }
            }),
        )
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .route("/ws/stream", get(ws_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe endpoint.
async fn health() -> &'static str {
    "OK"
}

/// Readiness probe endpoint.
async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Streaming translation endpoint: upgrade and hand off to the session.
async fn ws_stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| {
        let span = info_span!("session", id = %Uuid::new_v4());
        async move {
            let total = state.connection_opened();
            info!(total, "WebSocket connected");
            session::run_session(socket, state.engines(), state.config().clone()).await;
            let remaining = state.connection_closed();
            info!(remaining, "WebSocket closed");
        }
        .instrument(span)
    })
}

/// Wait for a shutdown signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
