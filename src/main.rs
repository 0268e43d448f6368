use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_beacon::cli::{Cli, Commands, LogFormat};
use a3s_beacon::config::BeaconConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let config = BeaconConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            database_url,
        } => {
            a3s_beacon::cli::serve::execute(config, host, port, database_url).await?;
        }
        Commands::Migrate { database_url } => {
            a3s_beacon::cli::migrate::execute(config, database_url).await?;
        }
        Commands::Identity {
            ip,
            user_agent,
            day,
        } => {
            a3s_beacon::cli::identity::execute(&config, &ip, &user_agent, day);
        }
    }

    Ok(())
}
