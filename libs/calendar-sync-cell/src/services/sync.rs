use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use appointment_cell::models::AppointmentStatus;
use appointment_cell::store::AppointmentStore;

use crate::error::{CalendarSyncError, ProviderError};
use crate::models::{Calendar, EventPage, EventQuery, EventStatus, ProviderEvent, SyncResult, SyncWindows};
use crate::provider::CalendarProvider;
use crate::services::conflict::ConflictDetector;
use crate::services::registry::SyncRegistry;
use crate::store::CalendarStore;

#[derive(Debug, Default, PartialEq, Eq)]
struct AppliedChanges {
    updated: usize,
    cancelled: usize,
}

/// Pulls provider changes for one calendar into the appointment ledger.
pub struct IncrementalSyncEngine {
    calendars: Arc<dyn CalendarStore>,
    appointments: Arc<dyn AppointmentStore>,
    provider: Arc<dyn CalendarProvider>,
    registry: Arc<SyncRegistry>,
    detector: ConflictDetector,
    windows: SyncWindows,
}

impl IncrementalSyncEngine {
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        appointments: Arc<dyn AppointmentStore>,
        provider: Arc<dyn CalendarProvider>,
        registry: Arc<SyncRegistry>,
        windows: SyncWindows,
    ) -> Self {
        let detector = ConflictDetector::new(provider.clone(), appointments.clone(), windows.clone());
        Self {
            calendars,
            appointments,
            provider,
            registry,
            detector,
            windows,
        }
    }

    pub async fn sync(&self, calendar: &Calendar) -> Result<SyncResult, CalendarSyncError> {
        self.sync_at(calendar, Utc::now()).await
    }

    #[instrument(skip(self, calendar), fields(calendar_id = %calendar.id))]
    pub async fn sync_at(&self, calendar: &Calendar, now: DateTime<Utc>) -> Result<SyncResult, CalendarSyncError> {
        let mut result = SyncResult::for_calendar(calendar.id);

        let token = self.registry
            .cached_token(calendar.id)
            .or_else(|| calendar.sync_token.clone());

        let page = match token {
            Some(sync_token) => {
                match self.provider
                    .list_events(&calendar.provider_calendar_id, EventQuery::Delta { sync_token })
                    .await
                {
                    Err(ProviderError::TokenGone) => {
                        warn!("Sync token for calendar {} rejected, running full resync", calendar.id);
                        self.calendars.update_sync_token(calendar.id, None).await?;
                        self.registry.remember_token(calendar.id, None);
                        result.full_resync = true;
                        self.full_listing(calendar, now).await?
                    }
                    other => other?,
                }
            }
            None => {
                result.full_resync = true;
                self.full_listing(calendar, now).await?
            }
        };

        result.events_processed = page.events.len();
        let applied = self.apply_events(&page.events).await?;
        result.appointments_updated = applied.updated;
        result.appointments_cancelled = applied.cancelled;

        result.conflicts = match self.detector.detect(calendar, now).await {
            Ok(conflicts) => conflicts,
            Err(e) => {
                warn!("Conflict detection failed for calendar {}, continuing: {}", calendar.id, e);
                Vec::new()
            }
        };

        self.persist_token(calendar, page).await?;

        info!(
            "Synced calendar {}: {} events, {} updated, {} cancelled, {} conflicts",
            calendar.id,
            result.events_processed,
            result.appointments_updated,
            result.appointments_cancelled,
            result.conflicts.len()
        );

        Ok(result)
    }

    async fn full_listing(&self, calendar: &Calendar, now: DateTime<Utc>) -> Result<EventPage, CalendarSyncError> {
        let time_min = now - self.windows.look_back;
        Ok(self.provider
            .list_events(&calendar.provider_calendar_id, EventQuery::Window { time_min })
            .await?)
    }

    async fn apply_events(&self, events: &[ProviderEvent]) -> Result<AppliedChanges, CalendarSyncError> {
        let mut applied = AppliedChanges::default();

        for event in events {
            let Some(appointment_id) = event.appointment_id else {
                continue;
            };
            let Some(appointment) = self.appointments.get(appointment_id).await? else {
                debug!("Event {} links unknown appointment {}", event.id, appointment_id);
                continue;
            };

            if event.status == EventStatus::Cancelled {
                if appointment.status != AppointmentStatus::Cancelled {
                    self.appointments.update_status(appointment.id, AppointmentStatus::Cancelled).await?;
                    applied.cancelled += 1;
                }
                continue;
            }

            if let (Some(start), Some(end)) = (event.start, event.end) {
                if start != appointment.start_time || end != appointment.end_time {
                    self.appointments.update_times(appointment.id, start, end).await?;
                    applied.updated += 1;
                }
            }
        }

        Ok(applied)
    }

    async fn persist_token(&self, calendar: &Calendar, page: EventPage) -> Result<(), CalendarSyncError> {
        if let Some(token) = page.next_sync_token {
            self.calendars.update_sync_token(calendar.id, Some(&token)).await?;
            self.registry.remember_token(calendar.id, Some(token));
        }
        Ok(())
    }
}
