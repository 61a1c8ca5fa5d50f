use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use appointment_cell::store::AppointmentStore;

use crate::error::CalendarSyncError;
use crate::models::{Calendar, EventDraft, ProviderEvent};
use crate::provider::CalendarProvider;
use crate::store::CalendarStore;

/// Administrative event management on practitioner calendars.
pub struct EventService {
    calendars: Arc<dyn CalendarStore>,
    appointments: Arc<dyn AppointmentStore>,
    provider: Arc<dyn CalendarProvider>,
}

impl EventService {
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        appointments: Arc<dyn AppointmentStore>,
        provider: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self { calendars, appointments, provider }
    }

    async fn calendar(&self, calendar_id: Uuid) -> Result<Calendar, CalendarSyncError> {
        self.calendars
            .get(calendar_id)
            .await?
            .ok_or_else(|| CalendarSyncError::NotFound(calendar_id.to_string()))
    }

    /// Creates the event and, when it mirrors an appointment, records the
    /// provider event id on that appointment.
    pub async fn create_event(&self, calendar_id: Uuid, draft: &EventDraft) -> Result<ProviderEvent, CalendarSyncError> {
        draft.validate()?;
        let calendar = self.calendar(calendar_id).await?;

        let event = self.provider.create_event(&calendar.provider_calendar_id, draft).await?;
        info!("Created event {} on calendar {}", event.id, calendar_id);

        if let Some(appointment_id) = draft.appointment_id {
            self.appointments.set_provider_event(appointment_id, Some(&event.id)).await?;
        }

        Ok(event)
    }

    pub async fn update_event(
        &self,
        calendar_id: Uuid,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<ProviderEvent, CalendarSyncError> {
        draft.validate()?;
        let calendar = self.calendar(calendar_id).await?;

        let event = self.provider
            .update_event(&calendar.provider_calendar_id, event_id, draft)
            .await?;
        info!("Updated event {} on calendar {}", event_id, calendar_id);

        Ok(event)
    }

    /// Deletes the event; the link on `appointment_id` is cleared best-effort.
    pub async fn delete_event(
        &self,
        calendar_id: Uuid,
        event_id: &str,
        appointment_id: Option<Uuid>,
    ) -> Result<(), CalendarSyncError> {
        let calendar = self.calendar(calendar_id).await?;

        self.provider.delete_event(&calendar.provider_calendar_id, event_id).await?;
        info!("Deleted event {} from calendar {}", event_id, calendar_id);

        if let Some(appointment_id) = appointment_id {
            if let Err(e) = self.appointments.set_provider_event(appointment_id, None).await {
                warn!("Failed to unlink event {} from appointment {}: {}", event_id, appointment_id, e);
            }
        }

        Ok(())
    }
}
