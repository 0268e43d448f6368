//! Alert lifecycle: create, cancel and the operator read path
//!
//! `create` persists the alert, its first ping, the contact lookup and an
//! audit entry in one transaction, then hands the alert to the
//! notification dispatcher once the transaction is committed.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{append_best_effort, record_best_effort, AuditEntry, AuditKind, AuditSink};
use crate::context::RequestContext;
use crate::error::{BeaconError, Result};
use crate::identity::IdentityAnonymizer;
use crate::notify::{AlertNotification, NotificationDispatcher};
use crate::store::{alerts, directory, Store};
use crate::types::{
    non_negative, ActiveAlertSummary, AlertDetails, AlertId, AlertLocation, AlertStatus,
    CancelAlert, CancelledAlert, Coordinates, CreateAlert, CreatedAlert,
};

/// Page size of `list_active` when the caller gives none
pub const DEFAULT_ACTIVE_LIMIT: i64 = 50;

/// Largest accepted `list_active` page
pub const MAX_ACTIVE_LIMIT: i64 = 500;

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns alert state transitions
#[derive(Clone)]
pub struct AlertManager {
    store: Store,
    anonymizer: Arc<IdentityAnonymizer>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditSink>,
    notify_timeout: Duration,
}

impl AlertManager {
    /// Manager auditing into `store`
    pub fn new(
        store: Store,
        anonymizer: Arc<IdentityAnonymizer>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            audit: Arc::new(store.clone()),
            store,
            anonymizer,
            dispatcher,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Sink for entries written outside a transaction
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Raise a new alert
    pub async fn create(&self, ctx: &RequestContext, request: CreateAlert) -> Result<CreatedAlert> {
        let coordinates = Coordinates::from_optional(request.latitude, request.longitude)?;
        let accuracy = non_negative("accuracy", request.accuracy)?;
        let identity_key = match request.identity_key {
            Some(key) => key,
            None => self
                .anonymizer
                .derive_at(ctx.origin_ip(), ctx.user_agent(), ctx.received_at),
        };

        let mut tx = self.store.begin().await?;

        let alert_id =
            alerts::insert_alert(&mut tx, &identity_key, coordinates, accuracy, ctx.received_at)
                .await?;
        if let Some(coordinates) = coordinates {
            alerts::insert_ping(
                &mut tx,
                alert_id,
                coordinates,
                accuracy,
                None,
                ctx.received_at,
                ctx.received_at,
            )
            .await?;
        }

        // An empty key means the caller opted out of contact lookup
        let contacts = if identity_key.is_empty() {
            Vec::new()
        } else {
            directory::active_contacts(&mut tx, &identity_key).await?
        };

        let entry = AuditEntry::new(
            AuditKind::AlertCreated,
            Some(&identity_key),
            format!("Alert {} created", alert_id),
            ctx.origin_ip.as_deref(),
        )
        .at(ctx.received_at);
        append_best_effort(&mut tx, &entry).await;

        tx.commit().await?;

        let location = coordinates.map(|c| AlertLocation::new(c, accuracy));
        let contacts_notified = contacts.len();

        tracing::info!(
            alert_id,
            contacts = contacts_notified,
            located = location.is_some(),
            "Alert created"
        );

        let notification =
            AlertNotification::new(alert_id, identity_key.clone(), contacts, location.clone());
        self.dispatch(ctx, &notification).await;

        Ok(CreatedAlert {
            alert_id,
            identity_key,
            status: AlertStatus::Active,
            contacts_notified,
            location,
        })
    }

    /// Deliver a notification; failures are logged and audited only
    async fn dispatch(&self, ctx: &RequestContext, notification: &AlertNotification) {
        let outcome =
            tokio::time::timeout(self.notify_timeout, self.dispatcher.notify(notification)).await;

        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.notify_timeout),
        };

        tracing::warn!(
            alert_id = notification.alert_id,
            notification_id = %notification.id,
            dispatcher = self.dispatcher.name(),
            reason = %reason,
            "Notification failed"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditKind::NotificationFailed,
                Some(&notification.identity_key),
                format!(
                    "Notification for alert {} failed: {}",
                    notification.alert_id, reason
                ),
                ctx.origin_ip.as_deref(),
            ),
        )
        .await;
    }

    /// Cancel an active alert
    ///
    /// A second cancel fails with `AlreadyCancelled`, including when two
    /// cancels race.
    pub async fn cancel(&self, ctx: &RequestContext, request: CancelAlert) -> Result<CancelledAlert> {
        let alert_id = request
            .alert_id
            .ok_or_else(|| BeaconError::InvalidInput("alert_id is required".to_string()))?;

        let mut tx = self.store.begin().await?;

        let alert = alerts::fetch_alert(&mut tx, alert_id)
            .await?
            .ok_or(BeaconError::NotFound(alert_id))?;
        if !alert.is_active() {
            return Err(BeaconError::AlreadyCancelled(alert_id));
        }
        if !alerts::mark_cancelled(&mut tx, alert_id, ctx.received_at).await? {
            return Err(BeaconError::AlreadyCancelled(alert_id));
        }

        let entry = AuditEntry::new(
            AuditKind::AlertCancelled,
            Some(&alert.anonymized_identity),
            format!("Alert {} cancelled", alert_id),
            ctx.origin_ip.as_deref(),
        )
        .at(ctx.received_at);
        append_best_effort(&mut tx, &entry).await;

        tx.commit().await?;

        tracing::info!(alert_id, "Alert cancelled");
        Ok(CancelledAlert {
            alert_id,
            cancelled: true,
        })
    }

    /// Alert with its trajectory
    pub async fn get(&self, alert_id: AlertId) -> Result<AlertDetails> {
        let mut conn = self.store.pool().acquire().await?;
        let alert = alerts::fetch_alert(&mut conn, alert_id)
            .await?
            .ok_or(BeaconError::NotFound(alert_id))?;
        let pings = alerts::fetch_pings(&mut conn, alert_id).await?;
        Ok(AlertDetails { alert, pings })
    }

    /// Active alerts, newest first
    pub async fn list_active(&self, limit: Option<i64>) -> Result<Vec<ActiveAlertSummary>> {
        let limit = match limit {
            None => DEFAULT_ACTIVE_LIMIT,
            Some(l) if (1..=MAX_ACTIVE_LIMIT).contains(&l) => l,
            Some(_) => {
                return Err(BeaconError::InvalidInput(format!(
                    "limit must be between 1 and {}",
                    MAX_ACTIVE_LIMIT
                )))
            }
        };
        self.store.list_active_alerts(limit).await
    }
}
