use crate::config::BeaconConfig;
use crate::error::Result;
use crate::server;

/// Execute the `serve` command: start the HTTP server.
pub async fn execute(
    mut config: BeaconConfig,
    host: Option<String>,
    port: Option<u16>,
    database_url: Option<String>,
) -> Result<()> {
    // Override config with CLI arguments
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(url) = database_url {
        config.database.url = url;
    }

    tracing::info!(
        address = %config.bind_address(),
        database = %config.database.url,
        ordering = ?config.location.ordering,
        "A3S Beacon server starting"
    );

    server::start(config).await
}
