//! Location ingestion for active alerts
//!
//! Every accepted ping is appended to the alert's trajectory. Whether it
//! also replaces the alert's latest position depends on `PingOrdering`.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audit::{append_best_effort, AuditEntry, AuditKind};
use crate::config::LocationConfig;
use crate::context::RequestContext;
use crate::error::{BeaconError, Result};
use crate::store::{alerts, Store};
use crate::types::{non_negative, Coordinates, LocationReport, RecordedLocation};

/// How concurrent or delayed pings resolve the alert's latest position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingOrdering {
    /// Last committed ping wins
    #[default]
    Arrival,
    /// Newest device timestamp wins; stale pings only extend history
    RecordedAt,
}

/// Accepts location pings for active alerts
#[derive(Clone)]
pub struct LocationIngestor {
    store: Store,
    ordering: PingOrdering,
    max_clock_skew: Duration,
}

impl LocationIngestor {
    pub fn new(store: Store, config: &LocationConfig) -> Self {
        Self {
            store,
            ordering: config.ordering,
            max_clock_skew: Duration::from_secs(config.max_clock_skew_secs),
        }
    }

    pub fn ordering(&self) -> PingOrdering {
        self.ordering
    }

    /// Record one ping
    ///
    /// Fails with `NotFound` for an unknown alert and `InvalidState` for a
    /// cancelled one; nothing is written in either case.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        report: LocationReport,
    ) -> Result<RecordedLocation> {
        let alert_id = report
            .alert_id
            .ok_or_else(|| BeaconError::InvalidInput("alert_id is required".to_string()))?;
        let coordinates = Coordinates::required(report.latitude, report.longitude)?;
        let accuracy = non_negative("accuracy", report.accuracy)?;
        let speed = non_negative("speed", report.speed)?;

        let recorded_at = report.recorded_at.unwrap_or(ctx.received_at);
        let limit = ChronoDuration::from_std(self.max_clock_skew)
            .ok()
            .and_then(|skew| ctx.received_at.checked_add_signed(skew));
        if limit.is_some_and(|limit| recorded_at > limit) {
            return Err(BeaconError::InvalidInput(
                "recorded_at is in the future".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        let alert = alerts::fetch_alert(&mut tx, alert_id)
            .await?
            .ok_or(BeaconError::NotFound(alert_id))?;
        if !alert.is_active() {
            return Err(BeaconError::InvalidState(format!(
                "Alert {} is {}",
                alert_id, alert.status
            )));
        }

        let ping_id = alerts::insert_ping(
            &mut tx,
            alert_id,
            coordinates,
            accuracy,
            speed,
            recorded_at,
            ctx.received_at,
        )
        .await?;

        let only_if_newer = self.ordering == PingOrdering::RecordedAt;
        let latest = alerts::update_last_location(
            &mut tx,
            alert_id,
            coordinates,
            accuracy,
            recorded_at,
            ctx.received_at,
            only_if_newer,
        )
        .await?;

        if !latest && !only_if_newer {
            // The status guard matched nothing: cancelled since the read
            return Err(BeaconError::InvalidState(format!(
                "Alert {} is no longer active",
                alert_id
            )));
        }

        let entry = AuditEntry::new(
            AuditKind::LocationUpdated,
            Some(&alert.anonymized_identity),
            format!(
                "Location of alert {} updated to {}, {}",
                alert_id, coordinates.latitude, coordinates.longitude
            ),
            ctx.origin_ip.as_deref(),
        )
        .at(ctx.received_at);
        append_best_effort(&mut tx, &entry).await;

        tx.commit().await?;

        tracing::debug!(alert_id, ping_id, latest, "Location recorded");
        Ok(RecordedLocation {
            alert_id,
            ping_id,
            updated: true,
            latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx() -> RequestContext {
        RequestContext::new(Some("10.0.0.1".to_string()), Some("test-agent".to_string()))
            .at(Utc.with_ymd_and_hms(2025, 3, 8, 22, 0, 0).unwrap())
    }

    fn report(alert_id: i64, lat: f64, lng: f64) -> LocationReport {
        LocationReport {
            alert_id: Some(alert_id),
            latitude: Some(lat),
            longitude: Some(lng),
            ..Default::default()
        }
    }

    async fn setup(ordering: PingOrdering) -> (Store, LocationIngestor, i64) {
        let store = Store::in_memory().await.unwrap();
        let config = LocationConfig {
            ordering,
            ..Default::default()
        };
        let ingestor = LocationIngestor::new(store.clone(), &config);
        let mut conn = store.pool().acquire().await.unwrap();
        let id = alerts::insert_alert(&mut conn, "abc", None, None, ctx().received_at)
            .await
            .unwrap();
        (store, ingestor, id)
    }

    #[tokio::test]
    async fn test_record_updates_latest() {
        let (store, ingestor, id) = setup(PingOrdering::Arrival).await;

        let recorded = ingestor
            .record(&ctx(), report(id, -16.6869, -49.2648))
            .await
            .unwrap();
        assert!(recorded.updated);
        assert!(recorded.latest);

        let alert = store.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.last_latitude, Some(-16.6869));
        assert_eq!(alert.last_recorded_at, Some(ctx().received_at));
        assert_eq!(store.ping_count(id).await.unwrap(), 1);

        let audit = store.recent_audit(1).await.unwrap();
        assert_eq!(audit[0].kind, AuditKind::LocationUpdated);
        assert_eq!(audit[0].subject_identity.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_record_validation() {
        let (store, ingestor, id) = setup(PingOrdering::Arrival).await;

        let missing_id = LocationReport {
            alert_id: None,
            ..report(id, -16.6, -49.2)
        };
        for bad in [
            missing_id,
            report(id, 0.0, -49.2),
            report(id, 91.0, -49.2),
            LocationReport {
                accuracy: Some(-1.0),
                ..report(id, -16.6, -49.2)
            },
            LocationReport {
                speed: Some(f64::NAN),
                ..report(id, -16.6, -49.2)
            },
            LocationReport {
                recorded_at: Some(ctx().received_at + ChronoDuration::hours(1)),
                ..report(id, -16.6, -49.2)
            },
        ] {
            let err = ingestor.record(&ctx(), bad).await.unwrap_err();
            assert!(matches!(err, BeaconError::InvalidInput(_)), "{:?}", err);
        }
        assert_eq!(store.ping_count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_unknown_alert() {
        let (_store, ingestor, _id) = setup(PingOrdering::Arrival).await;
        let err = ingestor
            .record(&ctx(), report(4242, -16.6, -49.2))
            .await
            .unwrap_err();
        assert!(matches!(err, BeaconError::NotFound(4242)));
    }

    #[tokio::test]
    async fn test_record_cancelled_alert_writes_nothing() {
        let (store, ingestor, id) = setup(PingOrdering::Arrival).await;
        {
            let mut conn = store.pool().acquire().await.unwrap();
            alerts::mark_cancelled(&mut conn, id, ctx().received_at)
                .await
                .unwrap();
        }

        let err = ingestor
            .record(&ctx(), report(id, -16.6, -49.2))
            .await
            .unwrap_err();
        assert!(matches!(err, BeaconError::InvalidState(_)));
        assert_eq!(store.ping_count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_arrival_ordering_last_write_wins() {
        let (store, ingestor, id) = setup(PingOrdering::Arrival).await;
        let now = ctx().received_at;

        ingestor
            .record(&ctx(), LocationReport {
                recorded_at: Some(now),
                ..report(id, -16.60, -49.20)
            })
            .await
            .unwrap();
        let late = ingestor
            .record(&ctx(), LocationReport {
                recorded_at: Some(now - ChronoDuration::minutes(5)),
                ..report(id, -16.70, -49.30)
            })
            .await
            .unwrap();

        assert!(late.latest);
        let alert = store.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.last_latitude, Some(-16.70));
    }

    #[tokio::test]
    async fn test_recorded_at_ordering_keeps_newest() {
        let (store, ingestor, id) = setup(PingOrdering::RecordedAt).await;
        let now = ctx().received_at;

        ingestor
            .record(&ctx(), LocationReport {
                recorded_at: Some(now),
                ..report(id, -16.60, -49.20)
            })
            .await
            .unwrap();
        let stale = ingestor
            .record(&ctx(), LocationReport {
                recorded_at: Some(now - ChronoDuration::minutes(5)),
                ..report(id, -16.70, -49.30)
            })
            .await
            .unwrap();

        assert!(stale.updated);
        assert!(!stale.latest);
        let alert = store.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.last_latitude, Some(-16.60));

        // Stale pings still land in the trajectory, ordered by device time
        let pings = store.list_pings(id).await.unwrap();
        assert_eq!(pings.len(), 2);
        assert_eq!(pings[0].latitude, -16.70);
    }

    #[test]
    fn test_ordering_serde() {
        assert_eq!(
            serde_json::to_value(PingOrdering::RecordedAt).unwrap(),
            "recorded_at"
        );
        assert_eq!(PingOrdering::default(), PingOrdering::Arrival);
    }
}
