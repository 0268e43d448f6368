//! Core alert, location, and directory types
//!
//! Request types deserialize with every field optional so that missing
//! fields surface as `InvalidInput` from validation rather than as
//! extractor rejections.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

/// Surrogate key of an alert
pub type AlertId = i64;

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Initial state, entered only via create
    Active,
    /// Terminal state, entered only via cancel
    Cancelled,
}

impl AlertStatus {
    /// Column value stored in `alerts.status`
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "cancelled" => Ok(AlertStatus::Cancelled),
            other => Err(BeaconError::InvalidState(format!(
                "Unknown alert status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated WGS84 position
///
/// Zero on either axis means "unset", so a `Coordinates` value never
/// holds a zero component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Validate a latitude/longitude pair
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(BeaconError::InvalidInput(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        if latitude == 0.0 || longitude == 0.0 {
            return Err(BeaconError::InvalidInput("Invalid coordinates".to_string()));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(BeaconError::InvalidInput(format!(
                "Latitude {} out of range [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(BeaconError::InvalidInput(format!(
                "Longitude {} out of range [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Validate an optional pair: both or neither must be set
    pub fn from_optional(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Self>> {
        let latitude = latitude.filter(|v| *v != 0.0);
        let longitude = longitude.filter(|v| *v != 0.0);
        match (latitude, longitude) {
            (None, None) => Ok(None),
            (Some(lat), Some(lng)) => Self::new(lat, lng).map(Some),
            _ => Err(BeaconError::InvalidInput(
                "Latitude and longitude must be provided together".to_string(),
            )),
        }
    }

    /// Validate a pair that must be present
    pub fn required(latitude: Option<f64>, longitude: Option<f64>) -> Result<Self> {
        Self::from_optional(latitude, longitude)?
            .ok_or_else(|| BeaconError::InvalidInput("Location not provided".to_string()))
    }
}

/// Map deep links for a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLinks {
    pub google_maps: String,
    pub waze: String,
}

impl MapLinks {
    pub fn for_coordinates(c: &Coordinates) -> Self {
        Self {
            google_maps: format!(
                "https://www.google.com/maps?q={},{}",
                c.latitude, c.longitude
            ),
            waze: format!(
                "https://www.waze.com/ul?ll={},{}&navigate=yes",
                c.latitude, c.longitude
            ),
        }
    }
}

/// Location attached to a created alert or a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub links: MapLinks,
}

impl AlertLocation {
    pub fn new(coordinates: Coordinates, accuracy: Option<f64>) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            accuracy,
            links: MapLinks::for_coordinates(&coordinates),
        }
    }
}

/// One panic-button episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub anonymized_identity: String,
    pub status: AlertStatus,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_accuracy: Option<f64>,
    /// Client timestamp of the ping behind the `last_*` projection
    pub last_recorded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// One reported position sample of an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    pub id: i64,
    pub alert_id: AlertId,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Emergency contact registered for an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub anonymized_identity: String,
    pub name: String,
    pub phone: String,
    pub order: i64,
    pub active: bool,
}

/// A support service from the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLocation {
    pub id: i64,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub open_24h: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
}

/// A service with its great-circle distance from the query point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyService {
    #[serde(flatten)]
    pub service: ServiceLocation,
    pub distance_km: f64,
}

/// Alert with its full trajectory
#[derive(Debug, Clone, Serialize)]
pub struct AlertDetails {
    pub alert: Alert,
    pub pings: Vec<LocationPing>,
}

/// Active alert with ping statistics
#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlertSummary {
    #[serde(flatten)]
    pub alert: Alert,
    pub ping_count: i64,
    pub last_ping_at: Option<DateTime<Utc>>,
}

// ─── Requests ────────────────────────────────────────────────────

/// Body of an alert creation request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAlert {
    /// Caller-held pseudonym; derived from the request when absent
    #[serde(default)]
    pub identity_key: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Body of a location update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationReport {
    #[serde(default)]
    pub alert_id: Option<AlertId>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    /// Device timestamp of the fix; defaults to server receive time
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Body of a cancel request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAlert {
    #[serde(default)]
    pub alert_id: Option<AlertId>,
}

/// Query of a proximity search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearbyQuery {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Radius in kilometers
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

// ─── Results ─────────────────────────────────────────────────────

/// Outcome of a successful create
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAlert {
    pub alert_id: AlertId,
    pub identity_key: String,
    pub status: AlertStatus,
    pub contacts_notified: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<AlertLocation>,
}

/// Outcome of a successful location update
#[derive(Debug, Clone, Serialize)]
pub struct RecordedLocation {
    pub alert_id: AlertId,
    pub ping_id: i64,
    pub updated: bool,
    /// Whether the ping became the alert's latest position
    pub latest: bool,
}

/// Outcome of a successful cancel
#[derive(Debug, Clone, Serialize)]
pub struct CancelledAlert {
    pub alert_id: AlertId,
    pub cancelled: bool,
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Reject negative or non-finite optional measurements
pub fn non_negative(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(BeaconError::InvalidInput(format!(
            "{} must be a non-negative number",
            field
        ))),
        other => Ok(other),
    }
}

/// Unix milliseconds for a timestamp
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Timestamp from stored Unix milliseconds
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
