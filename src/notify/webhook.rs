//! HTTP webhook sink

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use super::{AlertNotification, NotificationDispatcher, PayloadSealer};
use crate::config::WebhookConfig;
use crate::error::{BeaconError, Result};

/// Header carrying `sha256=<hex HMAC of the body>`
pub const SIGNATURE_HEADER: &str = "X-Beacon-Signature";

/// POSTs each notification as JSON to a fixed URL
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    secret: Option<Vec<u8>>,
    sealer: Option<Arc<PayloadSealer>>,
}

impl WebhookDispatcher {
    pub fn new(
        config: &WebhookConfig,
        timeout: Duration,
        sealer: Option<Arc<PayloadSealer>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BeaconError::Notification(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            secret: config
                .secret
                .as_ref()
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
            sealer,
        })
    }
}

/// `sha256=<hex>` signature of a body
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn notify(&self, notification: &AlertNotification) -> Result<()> {
        let body = notification.to_body(self.sealer.as_deref())?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| BeaconError::Notification(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BeaconError::Notification(format!(
                "{} responded with {}",
                self.url, status
            )));
        }

        tracing::debug!(
            notification_id = %notification.id,
            alert_id = notification.alert_id,
            status = status.as_u16(),
            "Webhook delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
