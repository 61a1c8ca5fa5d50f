use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::ProvisionError;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Tells the practitioner their calendar is ready and shared with them.
    Welcome {
        practitioner_id: Uuid,
        email: String,
        provider_calendar_id: String,
    },
    /// Tells practice staff a calendar was provisioned.
    AdminProvisioned {
        practitioner_id: Uuid,
        practitioner_email: String,
        admin_email: Option<String>,
        calendar_id: Uuid,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), ProvisionError>;
}

/// Posts notifications as JSON to an outbound webhook (mail relay, chat hook).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build notification HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ProvisionError> {
        let response = self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| ProvisionError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisionError::Notification(format!(
                "Notification endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no outbound endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ProvisionError> {
        info!("Notification (no endpoint configured): {:?}", notification);
        Ok(())
    }
}

pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match &config.notification_webhook_url {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.provider_timeout_seconds.max(1)),
        )),
        _ => Arc::new(LogNotifier),
    }
}
