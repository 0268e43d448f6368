//! NATS sink: publishes each notification to a subject

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use super::{AlertNotification, NotificationDispatcher, PayloadSealer};
use crate::config::NatsSinkConfig;
use crate::error::{BeaconError, Result};

/// Core NATS publisher
///
/// Fire-and-forget at the protocol level; the client is flushed after
/// each publish so a broken connection surfaces as an error.
pub struct NatsDispatcher {
    client: async_nats::Client,
    subject: String,
    sealer: Option<Arc<PayloadSealer>>,
}

impl NatsDispatcher {
    pub async fn connect(config: &NatsSinkConfig, sealer: Option<Arc<PayloadSealer>>) -> Result<Self> {
        let client = connect_options(config)
            .connect(&config.url)
            .await
            .map_err(|e| BeaconError::Notification(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, subject = %config.subject, "Connected to NATS");

        Ok(Self::from_client(client, config.subject.clone(), sealer))
    }

    pub fn from_client(
        client: async_nats::Client,
        subject: impl Into<String>,
        sealer: Option<Arc<PayloadSealer>>,
    ) -> Self {
        Self {
            client,
            subject: subject.into(),
            sealer,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

fn connect_options(config: &NatsSinkConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .name("a3s-beacon")
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }
    opts
}

#[async_trait]
impl NotificationDispatcher for NatsDispatcher {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        let body = Bytes::from(notification.to_body(self.sealer.as_deref())?);

        self.client
            .publish(self.subject.clone(), body)
            .await
            .map_err(|e| BeaconError::Notification(format!("{}: {}", self.subject, e)))?;
        self.client
            .flush()
            .await
            .map_err(|e| BeaconError::Notification(format!("{}: flush failed: {}", self.subject, e)))?;

        tracing::debug!(
            notification_id = %notification.id,
            alert_id = notification.alert_id,
            subject = %self.subject,
            "Notification published"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
