//! Alert lifecycle integration tests
//!
//! End-to-end tests over SQLite stores: create, track, cancel,
//! proximity search and notification failure handling. Concurrency
//! tests use a file database so pooled transactions really overlap.

use std::sync::Arc;
use std::time::Duration;

use a3s_beacon::audit::AuditSink;
use a3s_beacon::config::{DatabaseConfig, LocationConfig, ProximityConfig};
use a3s_beacon::notify::{MemoryDispatcher, NotificationDispatcher};
use a3s_beacon::{
    AlertManager, AlertNotification, AlertStatus, AuditKind, BeaconError, CancelAlert,
    CreateAlert, IdentityAnonymizer, LocationIngestor, LocationReport, NearbyQuery,
    PingOrdering, ProximitySearch, RequestContext, Store,
};
use async_trait::async_trait;

struct Harness {
    store: Store,
    alerts: AlertManager,
    locations: LocationIngestor,
    dispatcher: MemoryDispatcher,
}

async fn harness() -> Harness {
    harness_with(PingOrdering::Arrival).await
}

async fn harness_with(ordering: PingOrdering) -> Harness {
    let store = Store::in_memory().await.unwrap();
    let dispatcher = MemoryDispatcher::new();
    let alerts = AlertManager::new(
        store.clone(),
        Arc::new(IdentityAnonymizer::default()),
        Arc::new(dispatcher.clone()),
    );
    let locations = LocationIngestor::new(
        store.clone(),
        &LocationConfig {
            ordering,
            ..Default::default()
        },
    );
    Harness {
        store,
        alerts,
        locations,
        dispatcher,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(
        Some("203.0.113.7".to_string()),
        Some("Mozilla/5.0 (Android 14)".to_string()),
    )
}

fn ping(alert_id: i64, lat: f64, lng: f64) -> LocationReport {
    LocationReport {
        alert_id: Some(alert_id),
        latitude: Some(lat),
        longitude: Some(lng),
        accuracy: Some(8.0),
        ..Default::default()
    }
}

async fn add_contact(store: &Store, identity: &str, name: &str, order: i64) {
    sqlx::query(
        "INSERT INTO emergency_contacts (anonymized_identity, name, phone, sort_order) \
         VALUES (?, ?, '+55 62 99999-0000', ?)",
    )
    .bind(identity)
    .bind(name)
    .bind(order)
    .execute(store.pool())
    .await
    .unwrap();
}

// ─── Create ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_created_alert_is_readable_and_active() {
    let h = harness().await;

    let created = h
        .alerts
        .create(&ctx(), CreateAlert {
            latitude: Some(-16.6),
            longitude: Some(-49.3),
            accuracy: Some(15.0),
            ..Default::default()
        })
        .await
        .unwrap();

    let details = h.alerts.get(created.alert_id).await.unwrap();
    assert_eq!(details.alert.status, AlertStatus::Active);
    assert_eq!(details.alert.last_latitude, Some(-16.6));
    assert_eq!(details.pings.len(), 1);
    assert_eq!(details.pings[0].accuracy, Some(15.0));
}

#[tokio::test]
async fn test_derived_identity_is_stable_within_a_day() {
    let h = harness().await;

    let first = h.alerts.create(&ctx(), CreateAlert::default()).await.unwrap();
    let second = h.alerts.create(&ctx(), CreateAlert::default()).await.unwrap();
    assert_eq!(first.identity_key, second.identity_key);
    assert_ne!(first.alert_id, second.alert_id);

    let other_device = RequestContext::new(Some("203.0.113.8".to_string()), None);
    let third = h
        .alerts
        .create(&other_device, CreateAlert::default())
        .await
        .unwrap();
    assert_ne!(first.identity_key, third.identity_key);
}

#[tokio::test]
async fn test_contacts_are_notified_with_map_link() {
    let h = harness().await;
    let identity = IdentityAnonymizer::default().derive_at(
        ctx().origin_ip(),
        ctx().user_agent(),
        ctx().received_at,
    );
    add_contact(&h.store, &identity, "Ana", 1).await;
    add_contact(&h.store, &identity, "Maria", 2).await;
    add_contact(&h.store, "someone-else", "Bia", 1).await;

    let created = h
        .alerts
        .create(&ctx(), CreateAlert {
            latitude: Some(-16.6),
            longitude: Some(-49.3),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(created.contacts_notified, 2);
    let location = created.location.unwrap();
    assert_eq!(
        location.links.google_maps,
        "https://www.google.com/maps?q=-16.6,-49.3"
    );

    let sent = h.dispatcher.sent().await;
    assert_eq!(sent.len(), 1);
    let names: Vec<&str> = sent[0].contacts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Ana", "Maria"]);
}

// ─── Location ────────────────────────────────────────────────────

#[tokio::test]
async fn test_track_then_cancel() {
    let h = harness().await;
    let created = h.alerts.create(&ctx(), CreateAlert::default()).await.unwrap();
    let id = created.alert_id;

    let recorded = h.locations.record(&ctx(), ping(id, -16.61, -49.31)).await.unwrap();
    assert!(recorded.updated && recorded.latest);
    h.locations.record(&ctx(), ping(id, -16.62, -49.32)).await.unwrap();

    let alert = h.store.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.last_latitude, Some(-16.62));
    assert_eq!(h.store.ping_count(id).await.unwrap(), 2);

    h.alerts
        .cancel(&ctx(), CancelAlert { alert_id: Some(id) })
        .await
        .unwrap();

    let err = h
        .locations
        .record(&ctx(), ping(id, -16.63, -49.33))
        .await
        .unwrap_err();
    assert!(matches!(err, BeaconError::InvalidState(_)));
    assert_eq!(h.store.ping_count(id).await.unwrap(), 2);

    let err = h
        .alerts
        .cancel(&ctx(), CancelAlert { alert_id: Some(id) })
        .await
        .unwrap_err();
    assert!(matches!(err, BeaconError::AlreadyCancelled(_)));
}

#[tokio::test]
async fn test_ping_for_unknown_alert_writes_nothing() {
    let h = harness().await;

    let err = h
        .locations
        .record(&ctx(), ping(99999, -16.6, -49.3))
        .await
        .unwrap_err();
    assert!(matches!(err, BeaconError::NotFound(99999)));

    let pings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM location_pings")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(pings, 0);
}

#[tokio::test]
async fn test_recorded_at_policy_ignores_stale_pings() {
    let h = harness_with(PingOrdering::RecordedAt).await;
    let id = h
        .alerts
        .create(&ctx(), CreateAlert::default())
        .await
        .unwrap()
        .alert_id;
    let now = chrono::Utc::now();

    h.locations
        .record(&ctx(), LocationReport {
            recorded_at: Some(now),
            ..ping(id, -16.61, -49.31)
        })
        .await
        .unwrap();
    let stale = h
        .locations
        .record(&ctx(), LocationReport {
            recorded_at: Some(now - chrono::Duration::seconds(90)),
            ..ping(id, -16.70, -49.40)
        })
        .await
        .unwrap();

    assert!(!stale.latest);
    let alert = h.store.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.last_latitude, Some(-16.61));
    assert_eq!(h.store.ping_count(id).await.unwrap(), 2);
}

/// File-backed store with a real connection pool, so transactions overlap
async fn pooled_store(dir: &tempfile::TempDir) -> Store {
    let store = Store::connect(&DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("beacon.db").display()),
        max_connections: 8,
        acquire_timeout_secs: 10,
    })
    .await
    .unwrap();
    store.migrate().await.unwrap();
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pings_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = pooled_store(&dir).await;
    let alerts = AlertManager::new(
        store.clone(),
        Arc::new(IdentityAnonymizer::default()),
        Arc::new(MemoryDispatcher::new()),
    );
    let locations = Arc::new(LocationIngestor::new(store.clone(), &LocationConfig::default()));
    let first = alerts.create(&ctx(), CreateAlert::default()).await.unwrap().alert_id;
    let second = alerts.create(&ctx(), CreateAlert::default()).await.unwrap().alert_id;

    let tasks: Vec<_> = (1..=40)
        .map(|i| {
            let locations = locations.clone();
            let id = if i % 4 == 0 { second } else { first };
            tokio::spawn(async move {
                locations
                    .record(&ctx(), ping(id, -16.6 - i as f64 * 0.001, -49.3))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.ping_count(first).await.unwrap(), 30);
    assert_eq!(store.ping_count(second).await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_cancels_yield_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = pooled_store(&dir).await;
    let alerts = Arc::new(AlertManager::new(
        store.clone(),
        Arc::new(IdentityAnonymizer::default()),
        Arc::new(MemoryDispatcher::new()),
    ));
    let id = alerts.create(&ctx(), CreateAlert::default()).await.unwrap().alert_id;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let alerts = alerts.clone();
            tokio::spawn(async move {
                alerts
                    .cancel(&ctx(), CancelAlert { alert_id: Some(id) })
                    .await
            })
        })
        .collect();

    let mut cancelled = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => {
                assert!(outcome.cancelled);
                cancelled += 1;
            }
            Err(BeaconError::AlreadyCancelled(alert_id)) => {
                assert_eq!(alert_id, id);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((cancelled, rejected), (1, 1));

    let alert = store.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Cancelled);
}

// ─── Notifications ───────────────────────────────────────────────

struct DownDispatcher;

#[async_trait]
impl NotificationDispatcher for DownDispatcher {
    async fn notify(&self, _notification: &AlertNotification) -> a3s_beacon::Result<()> {
        Err(BeaconError::Notification("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "down"
    }
}

#[tokio::test]
async fn test_notification_failure_keeps_alert() {
    let store = Store::in_memory().await.unwrap();
    let alerts = AlertManager::new(
        store.clone(),
        Arc::new(IdentityAnonymizer::default()),
        Arc::new(DownDispatcher),
    )
    .with_notify_timeout(Duration::from_secs(1));

    let created = alerts
        .create(&ctx(), CreateAlert {
            latitude: Some(-16.6),
            longitude: Some(-49.3),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.status, AlertStatus::Active);
    assert!(store.get_alert(created.alert_id).await.unwrap().is_some());

    let kinds: Vec<AuditKind> = store
        .recent_audit(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![AuditKind::NotificationFailed, AuditKind::AlertCreated]
    );
}

#[tokio::test]
async fn test_store_is_an_audit_sink() {
    let store = Store::in_memory().await.unwrap();
    let sink: Arc<dyn AuditSink> = Arc::new(store.clone());
    sink.record(a3s_beacon::AuditEntry::new(
        AuditKind::AlertCreated,
        Some("abc"),
        "manual entry",
        None,
    ))
    .await
    .unwrap();
    assert_eq!(store.recent_audit(5).await.unwrap().len(), 1);
}

// ─── Proximity ───────────────────────────────────────────────────

#[tokio::test]
async fn test_nearby_over_store_directory() {
    let store = Store::in_memory().await.unwrap();
    let km_per_degree = 6371.0 * std::f64::consts::PI / 180.0;
    for (name, km, category) in [
        ("Far", 12.0, "security"),
        ("Mid", 5.0, "security"),
        ("Near", 2.0, "security"),
        ("Clinic", 3.0, "health"),
    ] {
        sqlx::query(
            "INSERT INTO service_locations (category, name, latitude, longitude) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(category)
        .bind(name)
        .bind(-16.6869 + km / km_per_degree)
        .bind(-49.2648)
        .execute(store.pool())
        .await
        .unwrap();
    }

    let search = ProximitySearch::new(Arc::new(store), ProximityConfig::default());
    let results = search
        .nearby(NearbyQuery {
            lat: Some(-16.6869),
            lng: Some(-49.2648),
            radius: Some(10.0),
            category: Some("security".to_string()),
        })
        .await
        .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.service.name.as_str()).collect();
    assert_eq!(names, vec!["Near", "Mid"]);
    assert!(results[0].distance_km < results[1].distance_km);
}
