use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::CalendarSyncError;
use crate::models::{
    Calendar, ChannelFailure, ChannelHealth, ChannelPolicy, ChannelReport, IntegrationStatus,
    Subscription, SubscriptionSummary,
};
use crate::provider::CalendarProvider;
use crate::services::metrics::SyncMetrics;
use crate::services::registry::SyncRegistry;
use crate::store::CalendarStore;

/// Keeps every calendar's push channel alive.
pub struct ChannelLifecycleManager {
    calendars: Arc<dyn CalendarStore>,
    provider: Arc<dyn CalendarProvider>,
    registry: Arc<SyncRegistry>,
    metrics: Arc<SyncMetrics>,
    policy: ChannelPolicy,
}

impl ChannelLifecycleManager {
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        provider: Arc<dyn CalendarProvider>,
        registry: Arc<SyncRegistry>,
        metrics: Arc<SyncMetrics>,
        policy: ChannelPolicy,
    ) -> Self {
        Self { calendars, provider, registry, metrics, policy }
    }

    /// Calendars whose channel lapses within the renewal window, plus active
    /// calendars that have no channel at all.
    pub async fn renewal_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Calendar>, CalendarSyncError> {
        let calendars = self.calendars.list().await?;
        Ok(calendars
            .into_iter()
            .filter(|c| {
                c.subscription_expires_within(now, self.policy.renewal_window)
                    || (c.is_active() && c.subscription_id.is_none())
            })
            .collect())
    }

    pub async fn renew_expiring(&self) -> Result<ChannelReport, CalendarSyncError> {
        self.renew_expiring_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn renew_expiring_at(&self, now: DateTime<Utc>) -> Result<ChannelReport, CalendarSyncError> {
        let candidates = self.renewal_candidates(now).await?;
        let mut report = ChannelReport {
            examined: candidates.len(),
            ..ChannelReport::default()
        };

        for calendar in candidates {
            record(&mut report, calendar.id, self.renew_calendar(&calendar).await);
        }

        info!(
            "Channel renewal pass: {} examined, {} renewed, {} failed",
            report.examined,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Opens a new channel, swaps it into the calendar record, then stops the
    /// superseded one. A failed watch marks the calendar as errored.
    pub async fn renew_calendar(&self, calendar: &Calendar) -> Result<Subscription, CalendarSyncError> {
        let channel_id = Uuid::new_v4().to_string();

        let subscription = match self.provider.watch(&calendar.provider_calendar_id, &channel_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.metrics.renewal_failed();
                warn!("Failed to renew channel for calendar {}: {}", calendar.id, e);
                if let Err(status_error) = self.calendars.set_status(calendar.id, IntegrationStatus::Error).await {
                    warn!("Failed to mark calendar {} as errored: {}", calendar.id, status_error);
                }
                return Err(e.into());
            }
        };

        self.calendars.update_subscription(calendar.id, Some(&subscription)).await?;
        if !calendar.is_active() {
            self.calendars.set_status(calendar.id, IntegrationStatus::Active).await?;
        }

        if let (Some(old_id), Some(old_resource)) = (&calendar.subscription_id, &calendar.subscription_resource_id) {
            if let Err(e) = self.provider.stop_channel(old_id, old_resource).await {
                warn!("Failed to stop superseded channel {}: {}", old_id, e);
            }
        }

        self.metrics.renewal_succeeded();
        info!("Renewed channel for calendar {} until {:?}", calendar.id, subscription.expires_at);
        Ok(subscription)
    }

    /// Stops and reopens the channel of every provisioned calendar.
    #[instrument(skip(self))]
    pub async fn recreate_all(&self) -> Result<ChannelReport, CalendarSyncError> {
        let calendars: Vec<Calendar> = self.calendars
            .list()
            .await?
            .into_iter()
            .filter(|c| c.integration_status != IntegrationStatus::Pending)
            .collect();

        let mut report = ChannelReport {
            examined: calendars.len(),
            ..ChannelReport::default()
        };

        for mut calendar in calendars {
            if let (Some(id), Some(resource)) = (&calendar.subscription_id, &calendar.subscription_resource_id) {
                if let Err(e) = self.provider.stop_channel(id, resource).await {
                    warn!("Failed to stop channel {} during recreate: {}", id, e);
                }
            }
            calendar.subscription_id = None;
            calendar.subscription_resource_id = None;

            record(&mut report, calendar.id, self.renew_calendar(&calendar).await);
        }

        info!(
            "Recreated channels: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Tears down one calendar's channel and clears its registry entries.
    pub async fn stop_calendar_channel(&self, calendar_id: Uuid) -> Result<Calendar, CalendarSyncError> {
        let calendar = self.calendars
            .get(calendar_id)
            .await?
            .ok_or_else(|| CalendarSyncError::NotFound(calendar_id.to_string()))?;

        if let (Some(id), Some(resource)) = (&calendar.subscription_id, &calendar.subscription_resource_id) {
            if let Err(e) = self.provider.stop_channel(id, resource).await {
                warn!("Failed to stop channel {} for calendar {}: {}", id, calendar_id, e);
            }
        }

        self.calendars.update_subscription(calendar_id, None).await?;
        self.registry.forget(calendar_id);

        Ok(Calendar {
            subscription_id: None,
            subscription_resource_id: None,
            subscription_expires_at: None,
            ..calendar
        })
    }

    pub async fn subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<SubscriptionSummary>, CalendarSyncError> {
        Ok(self.calendars
            .list()
            .await?
            .iter()
            .map(|c| SubscriptionSummary::of(c, now, self.policy.renewal_window))
            .collect())
    }

    pub async fn health(&self) -> Result<ChannelHealth, CalendarSyncError> {
        let calendars = self.calendars.list().await?;
        let tracked: Vec<&Calendar> = calendars
            .iter()
            .filter(|c| c.integration_status != IntegrationStatus::Pending)
            .collect();

        let total = tracked.len();
        let errored = tracked
            .iter()
            .filter(|c| c.integration_status == IntegrationStatus::Error)
            .count();
        let error_ratio = if total == 0 { 0.0 } else { errored as f64 / total as f64 };

        Ok(ChannelHealth {
            total,
            errored,
            error_ratio,
            healthy: error_ratio <= self.policy.error_threshold,
        })
    }
}

fn record(report: &mut ChannelReport, calendar_id: Uuid, outcome: Result<Subscription, CalendarSyncError>) {
    match outcome {
        Ok(_) => report.succeeded.push(calendar_id),
        Err(e) => report.failed.push(ChannelFailure {
            calendar_id,
            error: e.to_string(),
        }),
    }
}
