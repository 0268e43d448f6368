pub mod identity;
pub mod migrate;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// A3S Beacon - Panic-button alerts and nearby support services
#[derive(Debug, Parser)]
#[command(name = "a3s-beacon", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host address to bind to (overrides config)
        #[arg(long, env = "BEACON_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long, env = "BEACON_PORT")]
        port: Option<u16>,

        /// Database URL (overrides config)
        #[arg(long, env = "BEACON_DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Apply database migrations and exit
    Migrate {
        /// Database URL (overrides config)
        #[arg(long, env = "BEACON_DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Print the identity key derived for a client
    Identity {
        /// Client IP address
        #[arg(long, default_value = "")]
        ip: String,

        /// Client User-Agent header
        #[arg(long, default_value = "")]
        user_agent: String,

        /// Day to derive for (YYYY-MM-DD); defaults to today
        #[arg(long)]
        day: Option<chrono::NaiveDate>,
    },
}
