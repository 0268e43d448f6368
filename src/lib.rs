//! # a3s-beacon
//!
//! Anonymous panic-button alerting with live location tracking and
//! nearby support-service lookup.
//!
//! ## Overview
//!
//! A person in danger raises an alert, optionally with a position. The
//! alert is stored under a daily-rotating pseudonym derived from the
//! client's network identity, the person's emergency contacts are looked
//! up, and a notification is dispatched. While the alert is active the
//! client streams location pings; cancelling ends the episode.
//! Independently, callers can ask for the nearest support services.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use a3s_beacon::{AlertManager, CreateAlert, IdentityAnonymizer, RequestContext, Store};
//! use a3s_beacon::notify::LogDispatcher;
//!
//! # async fn example() -> a3s_beacon::Result<()> {
//! let store = Store::in_memory().await?;
//! let alerts = AlertManager::new(
//!     store,
//!     Arc::new(IdentityAnonymizer::default()),
//!     Arc::new(LogDispatcher),
//! );
//!
//! let ctx = RequestContext::new(Some("203.0.113.7".into()), Some("Mozilla/5.0".into()));
//! let created = alerts
//!     .create(&ctx, CreateAlert {
//!         latitude: Some(-16.6869),
//!         longitude: Some(-49.2648),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! println!("Alert {} raised", created.alert_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **AlertManager** - create / cancel / read alerts
//! - **LocationIngestor** - location pings for active alerts
//! - **ProximitySearch** - haversine search over a `ServiceDirectory`
//! - **NotificationDispatcher** trait - log, webhook, NATS, fan-out sinks
//! - **Store** - SQLite persistence with embedded migrations
//! - **api** / **server** - axum HTTP surface

pub mod alert;
pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod identity;
pub mod location;
pub mod notify;
pub mod proximity;
pub mod server;
pub mod store;
pub mod types;

// Re-export core types
pub use alert::AlertManager;
pub use audit::{AuditEntry, AuditKind, AuditSink, MemoryAuditLog};
pub use config::BeaconConfig;
pub use context::RequestContext;
pub use directory::{ContactDirectory, ServiceDirectory, StaticDirectory};
pub use error::{BeaconError, ErrorKind, Result};
pub use identity::{DayPolicy, IdentityAnonymizer};
pub use location::{LocationIngestor, PingOrdering};
pub use notify::{AlertNotification, NotificationDispatcher};
pub use proximity::{haversine_km, ProximitySearch};
pub use store::Store;
pub use types::{
    ActiveAlertSummary, Alert, AlertDetails, AlertId, AlertLocation, AlertStatus, CancelAlert,
    CancelledAlert, Coordinates, CreateAlert, CreatedAlert, EmergencyContact, LocationPing,
    LocationReport, MapLinks, NearbyQuery, NearbyService, RecordedLocation, ServiceLocation,
};
