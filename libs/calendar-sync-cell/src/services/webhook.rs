use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::CalendarSyncError;
use crate::models::{IntegrationStatus, ResourceState, SyncResult, WebhookNotification};
use crate::services::metrics::SyncMetrics;
use crate::services::registry::SyncRegistry;
use crate::services::sync::IncrementalSyncEngine;
use crate::store::CalendarStore;

/// Entry point for provider push notifications.
pub struct WebhookHandlerService {
    calendars: Arc<dyn CalendarStore>,
    registry: Arc<SyncRegistry>,
    engine: Arc<IncrementalSyncEngine>,
    metrics: Arc<SyncMetrics>,
    expected_token: Option<String>,
}

impl WebhookHandlerService {
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        registry: Arc<SyncRegistry>,
        engine: Arc<IncrementalSyncEngine>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            calendars,
            registry,
            engine,
            metrics,
            expected_token: None,
        }
    }

    /// Notifications whose channel token differs from `token` are ignored.
    pub fn with_channel_token(mut self, token: Option<String>) -> Self {
        self.expected_token = token;
        self
    }

    /// Only a failure to read the calendar store is returned as an error;
    /// every other outcome is described by the [`SyncResult`].
    #[instrument(skip(self, notification), fields(channel_id = %notification.channel_id, state = ?notification.resource_state))]
    pub async fn process(&self, notification: &WebhookNotification) -> Result<SyncResult, CalendarSyncError> {
        self.metrics.webhook_received();

        if let Some(expected) = &self.expected_token {
            if notification.channel_token.as_deref() != Some(expected.as_str()) {
                warn!("Ignoring notification for channel {} with unexpected token", notification.channel_id);
                return Ok(SyncResult::unresolved("Channel token mismatch"));
            }
        }

        let Some(calendar) = self.calendars.find_by_subscription(&notification.channel_id).await? else {
            info!("No calendar for subscription {}, likely a superseded channel", notification.channel_id);
            return Ok(SyncResult::unresolved(format!(
                "No calendar registered for subscription {}",
                notification.channel_id
            )));
        };

        match notification.resource_state {
            ResourceState::Sync => {
                debug!("Channel {} handshake for calendar {}", notification.channel_id, calendar.id);
                return Ok(SyncResult::acknowledged(calendar.id, "Channel handshake acknowledged"));
            }
            ResourceState::NotExists => {
                warn!("Provider reports calendar {} no longer exists", calendar.id);
                self.calendars.set_status(calendar.id, IntegrationStatus::Error).await?;
                return Ok(SyncResult::acknowledged(calendar.id, "Calendar removed at provider"));
            }
            ResourceState::Exists => {}
        }

        let Some(_guard) = self.registry.try_acquire(calendar.id) else {
            debug!("Calendar {} already syncing, skipping notification", calendar.id);
            self.metrics.sync_skipped();
            return Ok(SyncResult::skipped(calendar.id));
        };

        match self.engine.sync(&calendar).await {
            Ok(result) => {
                self.metrics.sync_completed(result.full_resync, result.conflicts.len());
                Ok(result)
            }
            Err(e) => {
                self.metrics.sync_failed();
                warn!("Sync failed for calendar {}: {}", calendar.id, e);

                if let CalendarSyncError::Provider(provider_error) = &e {
                    if provider_error.requires_attention() {
                        if let Err(status_error) = self.calendars
                            .set_status(calendar.id, IntegrationStatus::Error)
                            .await
                        {
                            warn!("Failed to mark calendar {} as errored: {}", calendar.id, status_error);
                        }
                    }
                }

                Ok(SyncResult::failed(calendar.id, e.to_string()))
            }
        }
    }
}
