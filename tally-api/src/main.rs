//! Tally API Server Entry Point
//!
//! Bootstraps configuration and telemetry, opens the data directory, and
//! starts the Axum HTTP server.

use tally_api::telemetry::{init_tracing, TelemetryConfig};
use tally_api::{build_state, create_router, ApiConfig, ApiError, ApiResult};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let config = ApiConfig::from_env();
    let state = build_state(&config)?;
    let app = create_router(state, &config);

    let addr = config.bind_addr()?;
    tracing::info!(
        %addr,
        data_dir = %config.data_dir.display(),
        cache_capacity = config.cache_capacity,
        checkout_timeout_ms = config.checkout_timeout.map(|t| t.as_millis() as u64),
        invalidate_on_write = config.invalidate_on_write,
        "Starting tally API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on ctrl-c. In-flight requests are allowed to finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
