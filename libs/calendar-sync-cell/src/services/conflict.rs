use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::conflict::intervals_overlap;
use appointment_cell::store::AppointmentStore;

use crate::error::CalendarSyncError;
use crate::models::{BusyInterval, Calendar, ConflictRecord, SyncWindows};
use crate::provider::CalendarProvider;

/// Cross-checks provider busy time against local appointments.
pub struct ConflictDetector {
    provider: Arc<dyn CalendarProvider>,
    appointments: Arc<dyn AppointmentStore>,
    windows: SyncWindows,
}

impl ConflictDetector {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        appointments: Arc<dyn AppointmentStore>,
        windows: SyncWindows,
    ) -> Self {
        Self { provider, appointments, windows }
    }

    /// Finds appointments overlapping busy time that is not their own event
    /// and flags them for rescheduling. Errors only when the provider or the
    /// appointment ledger cannot be read.
    pub async fn detect(&self, calendar: &Calendar, now: DateTime<Utc>) -> Result<Vec<ConflictRecord>, CalendarSyncError> {
        let until = now + self.windows.look_ahead;

        let busy = self.provider
            .query_busy(&calendar.provider_calendar_id, now, until)
            .await?;
        let appointments = self.appointments
            .find_active_in_range(calendar.practitioner_id, now, until)
            .await?;

        let conflicts = find_conflicts(&busy, &appointments, now);

        for conflict in &conflicts {
            warn!(
                "Appointment {} overlaps provider busy time {} - {}",
                conflict.appointment_id, conflict.interval.start, conflict.interval.end
            );
            if let Err(e) = self.appointments
                .update_status(conflict.appointment_id, AppointmentStatus::Rescheduled)
                .await
            {
                warn!("Failed to flag appointment {} for rescheduling: {}", conflict.appointment_id, e);
            }
        }

        if !conflicts.is_empty() {
            info!("Detected {} conflicts on calendar {}", conflicts.len(), calendar.id);
        }

        Ok(conflicts)
    }
}

/// Busy time as seen by one appointment: when it already has a provider
/// event, its own slot is removed since that slot is the appointment itself.
/// Events of other appointments stay busy.
pub fn foreign_busy(busy: &[BusyInterval], appointment: &Appointment) -> Vec<BusyInterval> {
    if appointment.provider_event_id.is_none() {
        return busy.to_vec();
    }
    let (hole_start, hole_end) = (appointment.start_time, appointment.end_time);

    let mut residual = Vec::new();
    for interval in busy {
        if !intervals_overlap(hole_start, hole_end, interval.start, interval.end) {
            residual.push(*interval);
            continue;
        }
        if interval.start < hole_start {
            residual.push(BusyInterval::new(interval.start, hole_start));
        }
        if hole_end < interval.end {
            residual.push(BusyInterval::new(hole_end, interval.end));
        }
    }

    residual
}

pub fn find_conflicts(busy: &[BusyInterval], appointments: &[Appointment], now: DateTime<Utc>) -> Vec<ConflictRecord> {
    appointments
        .iter()
        .filter(|a| a.is_active())
        .filter_map(|a| {
            foreign_busy(busy, a)
                .into_iter()
                .find(|b| intervals_overlap(a.start_time, a.end_time, b.start, b.end))
                .map(|b| ConflictRecord {
                    appointment_id: a.id,
                    practitioner_id: a.practitioner_id,
                    interval: b,
                    detected_at: now,
                })
        })
        .collect()
}
