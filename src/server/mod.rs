pub mod router;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::BeaconConfig;
use crate::error::{BeaconError, Result};
use crate::notify;
use crate::store::Store;

/// Start the HTTP server with the given configuration.
///
/// Runs until Ctrl+C, then drains in-flight requests.
pub async fn start(config: BeaconConfig) -> Result<()> {
    config.validate()?;

    let store = Store::connect(&config.database).await?;
    store.migrate().await?;

    let dispatcher = notify::from_config(&config.notifications).await?;

    let bind_addr = config.bind_address();
    let app_state = state::AppState::new(store, dispatcher, Arc::new(config));
    let app = router::build(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| BeaconError::Server(format!("Failed to bind to {bind_addr}: {e}")))?;

    tracing::info!("Server listening on {bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| BeaconError::Server(format!("Server error: {e}")))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
