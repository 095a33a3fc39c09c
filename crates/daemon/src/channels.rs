//! Channel adapters wired into the engine by the daemon

use async_trait::async_trait;
use notiq_core::domain::{ChannelPayload, Notification};
use notiq_core::port::{DeliveryError, DeliveryHandler};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

/// POSTs webhook payloads as JSON
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notiq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// Map a non-success HTTP status to a delivery error
pub fn classify_status(status: StatusCode) -> DeliveryError {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    match status.as_u16() {
        410 => DeliveryError::new("UNSUBSCRIBED", format!("endpoint gone: {}", reason)),
        400 | 404 | 422 => DeliveryError::new("INVALID_RECIPIENT", format!("rejected: {}", reason)),
        403 => DeliveryError::new("BLOCKED", format!("forbidden: {}", reason)),
        code => DeliveryError::new(format!("HTTP_{}", code), reason),
    }
}

#[async_trait]
impl DeliveryHandler for WebhookHandler {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let ChannelPayload::Webhook { url, body } = &notification.payload else {
            return Err(DeliveryError::new(
                "INVALID_RECIPIENT",
                format!("notification {} has no webhook payload", notification.id),
            ));
        };

        let response = self
            .client
            .post(url)
            .header("X-Notiq-Notification-Id", &notification.id)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::new("NETWORK", e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(notification_id = %notification.id, status = status.as_u16(), "Webhook delivered");
            Ok(())
        } else {
            Err(classify_status(status))
        }
    }
}

/// Records deliveries in the log for channels without a wired transport
pub struct LogSinkHandler;

#[async_trait]
impl DeliveryHandler for LogSinkHandler {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let recipient = match &notification.payload {
            ChannelPayload::Email { to, .. } => to.as_str(),
            ChannelPayload::Push { device_token, .. } => device_token.as_str(),
            ChannelPayload::Sms { phone_number, .. } => phone_number.as_str(),
            ChannelPayload::InApp { user_id, .. } => user_id.as_str(),
            ChannelPayload::Webhook { url, .. } => url.as_str(),
        };
        info!(
            notification_id = %notification.id,
            channel = %notification.channel(),
            priority = %notification.priority,
            recipient,
            "Notification delivered to log sink"
        );
        Ok(())
    }
}
