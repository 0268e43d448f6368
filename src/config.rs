use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};
use crate::identity::DayPolicy;
use crate::location::PingOrdering;

/// Top-level configuration for the beacon server.
///
/// Every section is optional in the TOML file; missing keys fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub proximity: ProximityConfig,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address for the HTTP server (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server (default: 8787)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single request, including storage I/O
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Take the origin IP from the first `X-Forwarded-For` hop
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a request may wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Calendar used for the daily pseudonym rotation
    #[serde(default)]
    pub day_policy: DayPolicy,

    /// Optional HMAC key for identity digests
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_radius_km")]
    pub default_radius_km: f64,

    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,

    /// Result cap per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// How out-of-order pings affect the alert's latest position
    #[serde(default)]
    pub ordering: PingOrdering,

    /// Largest accepted gap between a ping's `recorded_at` and server time
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Emit a structured log line per alert
    #[serde(default = "default_true")]
    pub log: bool,

    /// Upper bound on one dispatch
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    #[serde(default)]
    pub nats: Option<NatsSinkConfig>,

    /// Encrypt outbound payloads
    #[serde(default)]
    pub seal: Option<SealConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// HMAC key for the `X-Beacon-Signature` header
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsSinkConfig {
    pub url: String,

    #[serde(default = "default_nats_subject")]
    pub subject: String,

    /// Authentication token
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_nats_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealConfig {
    pub key_id: String,

    /// Base64-encoded 32-byte AES-256 key
    pub key: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_database_url() -> String {
    "sqlite://beacon.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_radius_km() -> f64 {
    10.0
}

fn default_max_radius_km() -> f64 {
    200.0
}

fn default_max_results() -> usize {
    30
}

fn default_max_clock_skew_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_notify_timeout_secs() -> u64 {
    5
}

fn default_nats_subject() -> String {
    "beacon.alerts.created".to_string()
}

fn default_nats_connect_timeout_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            trust_forwarded_for: false,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            default_radius_km: default_radius_km(),
            max_radius_km: default_max_radius_km(),
            max_results: default_max_results(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            ordering: PingOrdering::default(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            log: true,
            timeout_secs: default_notify_timeout_secs(),
            webhook: None,
            nats: None,
            seal: None,
        }
    }
}

impl BeaconConfig {
    /// Load configuration from a TOML file.
    /// Returns the default config when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    BeaconError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.proximity;
        if !(p.default_radius_km.is_finite() && p.default_radius_km > 0.0) {
            return Err(BeaconError::Config(
                "proximity.default_radius_km must be positive".to_string(),
            ));
        }
        if !(p.max_radius_km.is_finite() && p.max_radius_km >= p.default_radius_km) {
            return Err(BeaconError::Config(
                "proximity.max_radius_km must be at least default_radius_km".to_string(),
            ));
        }
        if p.max_results == 0 {
            return Err(BeaconError::Config(
                "proximity.max_results must be greater than zero".to_string(),
            ));
        }
        if !self.identity.day_policy.is_valid() {
            return Err(BeaconError::Config(
                "identity.day_policy offset_minutes must be within +/-1439".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(BeaconError::Config(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(BeaconError::Config(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the server bind address string (e.g., "127.0.0.1:8787").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
