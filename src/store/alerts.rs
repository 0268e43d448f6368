//! Alert and location-ping queries

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::Store;
use crate::error::{BeaconError, Result};
use crate::types::{
    from_millis, to_millis, ActiveAlertSummary, Alert, AlertId, AlertStatus, Coordinates,
    LocationPing,
};

const ALERT_COLUMNS: &str = "id, anonymized_identity, status, last_latitude, last_longitude, \
     last_accuracy, last_recorded_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: i64,
    anonymized_identity: String,
    status: String,
    last_latitude: Option<f64>,
    last_longitude: Option<f64>,
    last_accuracy: Option<f64>,
    last_recorded_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<AlertRow> for Alert {
    type Error = BeaconError;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(Alert {
            id: row.id,
            anonymized_identity: row.anonymized_identity,
            status: row.status.parse()?,
            last_latitude: row.last_latitude,
            last_longitude: row.last_longitude,
            last_accuracy: row.last_accuracy,
            last_recorded_at: row.last_recorded_at.map(from_millis),
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PingRow {
    id: i64,
    alert_id: i64,
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    speed: Option<f64>,
    recorded_at: i64,
    received_at: i64,
}

impl From<PingRow> for LocationPing {
    fn from(row: PingRow) -> Self {
        LocationPing {
            id: row.id,
            alert_id: row.alert_id,
            latitude: row.latitude,
            longitude: row.longitude,
            accuracy: row.accuracy,
            speed: row.speed,
            recorded_at: from_millis(row.recorded_at),
            received_at: from_millis(row.received_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    alert: AlertRow,
    ping_count: i64,
    last_ping_at: Option<i64>,
}

/// Insert a new active alert, seeding `last_*` from the first position
pub async fn insert_alert(
    conn: &mut SqliteConnection,
    identity: &str,
    coordinates: Option<Coordinates>,
    accuracy: Option<f64>,
    at: DateTime<Utc>,
) -> Result<AlertId> {
    let now = to_millis(at);
    let result = sqlx::query(
        "INSERT INTO alerts \
         (anonymized_identity, status, last_latitude, last_longitude, last_accuracy, \
          last_recorded_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(identity)
    .bind(AlertStatus::Active.as_str())
    .bind(coordinates.map(|c| c.latitude))
    .bind(coordinates.map(|c| c.longitude))
    .bind(coordinates.and(accuracy))
    .bind(coordinates.map(|_| now))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Append one ping to an alert's history
pub async fn insert_ping(
    conn: &mut SqliteConnection,
    alert_id: AlertId,
    coordinates: Coordinates,
    accuracy: Option<f64>,
    speed: Option<f64>,
    recorded_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO location_pings \
         (alert_id, latitude, longitude, accuracy, speed, recorded_at, received_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(alert_id)
    .bind(coordinates.latitude)
    .bind(coordinates.longitude)
    .bind(accuracy)
    .bind(speed)
    .bind(to_millis(recorded_at))
    .bind(to_millis(received_at))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_alert(conn: &mut SqliteConnection, alert_id: AlertId) -> Result<Option<Alert>> {
    let sql = format!("SELECT {} FROM alerts WHERE id = ?", ALERT_COLUMNS);
    let row: Option<AlertRow> = sqlx::query_as(&sql)
        .bind(alert_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Alert::try_from).transpose()
}

/// Move an active alert to cancelled
///
/// Returns false when the alert was not active at update time.
pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    alert_id: AlertId,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE alerts SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(AlertStatus::Cancelled.as_str())
    .bind(to_millis(at))
    .bind(alert_id)
    .bind(AlertStatus::Active.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Project a ping onto the alert's `last_*` fields
///
/// Only active alerts are touched. With `only_if_newer`, an alert whose
/// projection comes from a later `recorded_at` is left as is. Returns
/// whether the row changed.
pub async fn update_last_location(
    conn: &mut SqliteConnection,
    alert_id: AlertId,
    coordinates: Coordinates,
    accuracy: Option<f64>,
    recorded_at: DateTime<Utc>,
    at: DateTime<Utc>,
    only_if_newer: bool,
) -> Result<bool> {
    let mut sql = String::from(
        "UPDATE alerts SET last_latitude = ?, last_longitude = ?, last_accuracy = ?, \
         last_recorded_at = ?, updated_at = ? WHERE id = ? AND status = ?",
    );
    if only_if_newer {
        sql.push_str(" AND (last_recorded_at IS NULL OR last_recorded_at <= ?)");
    }

    let recorded_at = to_millis(recorded_at);
    let mut query = sqlx::query(&sql)
        .bind(coordinates.latitude)
        .bind(coordinates.longitude)
        .bind(accuracy)
        .bind(recorded_at)
        .bind(to_millis(at))
        .bind(alert_id)
        .bind(AlertStatus::Active.as_str());
    if only_if_newer {
        query = query.bind(recorded_at);
    }

    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Trajectory of an alert, oldest first
pub async fn fetch_pings(
    conn: &mut SqliteConnection,
    alert_id: AlertId,
) -> Result<Vec<LocationPing>> {
    let rows: Vec<PingRow> = sqlx::query_as(
        "SELECT id, alert_id, latitude, longitude, accuracy, speed, recorded_at, received_at \
         FROM location_pings WHERE alert_id = ? ORDER BY recorded_at ASC, id ASC",
    )
    .bind(alert_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(LocationPing::from).collect())
}

pub async fn count_pings(conn: &mut SqliteConnection, alert_id: AlertId) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM location_pings WHERE alert_id = ?")
        .bind(alert_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Active alerts with ping statistics, newest first
pub async fn fetch_active_summaries(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<ActiveAlertSummary>> {
    let rows: Vec<SummaryRow> = sqlx::query_as(
        "SELECT a.id, a.anonymized_identity, a.status, a.last_latitude, a.last_longitude, \
                a.last_accuracy, a.last_recorded_at, a.created_at, a.updated_at, \
                COUNT(p.id) AS ping_count, MAX(p.recorded_at) AS last_ping_at \
         FROM alerts a \
         LEFT JOIN location_pings p ON p.alert_id = a.id \
         WHERE a.status = ? \
         GROUP BY a.id \
         ORDER BY a.created_at DESC, a.id DESC \
         LIMIT ?",
    )
    .bind(AlertStatus::Active.as_str())
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(ActiveAlertSummary {
                alert: Alert::try_from(row.alert)?,
                ping_count: row.ping_count,
                last_ping_at: row.last_ping_at.map(from_millis),
            })
        })
        .collect()
}

impl Store {
    /// Read one alert
    pub async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        let mut conn = self.pool().acquire().await?;
        fetch_alert(&mut conn, alert_id).await
    }

    /// Read an alert's trajectory
    pub async fn list_pings(&self, alert_id: AlertId) -> Result<Vec<LocationPing>> {
        let mut conn = self.pool().acquire().await?;
        fetch_pings(&mut conn, alert_id).await
    }

    /// Number of pings recorded for an alert
    pub async fn ping_count(&self, alert_id: AlertId) -> Result<i64> {
        let mut conn = self.pool().acquire().await?;
        count_pings(&mut conn, alert_id).await
    }

    /// Active alerts for operator views
    pub async fn list_active_alerts(&self, limit: i64) -> Result<Vec<ActiveAlertSummary>> {
        let mut conn = self.pool().acquire().await?;
        fetch_active_summaries(&mut conn, limit).await
    }
}
