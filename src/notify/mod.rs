//! Notification dispatch for newly created alerts
//!
//! The alert manager hands every committed alert to one
//! `NotificationDispatcher`. Dispatchers are pluggable: the default logs a
//! structured warning, and deployments can add a webhook, a NATS subject,
//! or several sinks at once through `FanoutDispatcher`.
//!
//! Dispatch always runs after the alert is durable. A failing sink never
//! undoes or fails the alert.

pub mod nats;
pub mod seal;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::NotificationConfig;
use crate::error::{BeaconError, Result};
use crate::types::{AlertId, AlertLocation, EmergencyContact};

pub use nats::NatsDispatcher;
pub use seal::{PayloadSealer, SealedPayload};
pub use webhook::WebhookDispatcher;

/// What gets sent out for one alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    /// Unique per dispatch (`ntf-<uuid>`)
    pub id: String,
    pub alert_id: AlertId,
    pub identity_key: String,
    pub contacts: Vec<EmergencyContact>,
    pub location: Option<AlertLocation>,
    pub created_at: DateTime<Utc>,
}

impl AlertNotification {
    pub fn new(
        alert_id: AlertId,
        identity_key: impl Into<String>,
        contacts: Vec<EmergencyContact>,
        location: Option<AlertLocation>,
    ) -> Self {
        Self {
            id: format!("ntf-{}", uuid::Uuid::new_v4()),
            alert_id,
            identity_key: identity_key.into(),
            contacts,
            location,
            created_at: Utc::now(),
        }
    }

    /// JSON body for sinks that leave the process, sealed when configured
    pub fn to_body(&self, sealer: Option<&PayloadSealer>) -> Result<Vec<u8>> {
        let value = serde_json::to_value(self)?;
        let value = match sealer {
            Some(sealer) => sealer.seal(&value)?,
            None => value,
        };
        Ok(serde_json::to_vec(&value)?)
    }
}

/// Sink for alert notifications
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &AlertNotification) -> Result<()>;

    /// Short sink name for logs
    fn name(&self) -> &str;
}

/// Drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn notify(&self, _notification: &AlertNotification) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Emits one structured warning per alert
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, n: &AlertNotification) -> Result<()> {
        let (latitude, longitude) = n
            .location
            .as_ref()
            .map(|l| (Some(l.latitude), Some(l.longitude)))
            .unwrap_or((None, None));

        tracing::warn!(
            notification_id = %n.id,
            alert_id = n.alert_id,
            contacts = n.contacts.len(),
            latitude = ?latitude,
            longitude = ?longitude,
            google_maps = ?n.location.as_ref().map(|l| l.links.google_maps.as_str()),
            "Emergency alert raised"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Keeps notifications in memory, for development and testing
#[derive(Debug, Default, Clone)]
pub struct MemoryDispatcher {
    sent: Arc<RwLock<Vec<AlertNotification>>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered so far, oldest first
    pub async fn sent(&self) -> Vec<AlertNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for MemoryDispatcher {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        self.sent.write().await.push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Delivers to every child sink
///
/// All children are tried even when one fails; the result is an error
/// naming every failed sink.
pub struct FanoutDispatcher {
    sinks: Vec<Arc<dyn NotificationDispatcher>>,
}

impl FanoutDispatcher {
    pub fn new(sinks: Vec<Arc<dyn NotificationDispatcher>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutDispatcher {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        let results =
            futures::future::join_all(self.sinks.iter().map(|s| s.notify(notification))).await;

        let failures: Vec<String> = self
            .sinks
            .iter()
            .zip(results)
            .filter_map(|(sink, result)| {
                result.err().map(|e| format!("{}: {}", sink.name(), e))
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BeaconError::Notification(failures.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

/// Build the dispatcher described by `[notifications]`
///
/// A single configured sink is returned as is; several are wrapped in a
/// `FanoutDispatcher`; none yields a `NoopDispatcher`.
pub async fn from_config(config: &NotificationConfig) -> Result<Arc<dyn NotificationDispatcher>> {
    let sealer = config
        .seal
        .as_ref()
        .map(PayloadSealer::from_config)
        .transpose()?
        .map(Arc::new);

    let mut sinks: Vec<Arc<dyn NotificationDispatcher>> = Vec::new();
    if config.log {
        sinks.push(Arc::new(LogDispatcher));
    }
    if let Some(webhook) = &config.webhook {
        sinks.push(Arc::new(WebhookDispatcher::new(
            webhook,
            config.timeout(),
            sealer.clone(),
        )?));
    }
    if let Some(nats) = &config.nats {
        sinks.push(Arc::new(NatsDispatcher::connect(nats, sealer.clone()).await?));
    }

    let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
    tracing::info!(sinks = ?names, sealed = sealer.is_some(), "Notification sinks ready");

    Ok(match sinks.len() {
        0 => Arc::new(NoopDispatcher),
        1 => sinks.remove(0),
        _ => Arc::new(FanoutDispatcher::new(sinks)),
    })
}
