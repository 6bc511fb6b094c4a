//! Speech-to-speech translation WebSocket server

use std::sync::Arc;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::info;

use simulvox::adapters::EngineSet;
use simulvox::config::AppConfig;
use simulvox::logging::init_logging;
use simulvox::server::{build_router, shutdown_signal, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(&config.to_log_config())?;
    info!(device = %config.device, "Model placement preference (applied by adapter services)");

    let recorder_handle = PrometheusBuilder::new().install_recorder()?;

    let engines = EngineSet::from_config(&config);
    let state = Arc::new(AppState::new(engines, config.clone()));
    let app = build_router(state.clone(), recorder_handle);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");
    info!("Streaming endpoint: ws://{addr}/ws/stream");
    state.mark_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
