use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::conflict::intervals_overlap;

const APPOINTMENTS_TABLE: &str = "appointments";

/// Access patterns the scheduling core needs from the appointment ledger.
///
/// Appointments are never hard-deleted; every mutation is a field update.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Appointment>, AppointmentError>;

    /// Active, non-archived appointments of a practitioner intersecting `[from, to)`.
    async fn find_active_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Fails with [`AppointmentError::DuplicateKey`] when the idempotency key is taken.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn update_times(
        &self,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError>;

    async fn update_status(&self, id: Uuid, status: AppointmentStatus) -> Result<(), AppointmentError>;

    async fn set_provider_event(&self, id: Uuid, event_id: Option<&str>) -> Result<(), AppointmentError>;
}

pub(crate) fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ==============================================================================
// SUPABASE-BACKED STORE
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn patch(&self, id: Uuid, patch: serde_json::Value) -> Result<(), AppointmentError> {
        let touched = self.supabase
            .update(APPOINTMENTS_TABLE, &format!("id=eq.{}", id), patch)
            .await?;

        if touched == 0 {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase
            .select(APPOINTMENTS_TABLE, &format!("id=eq.{}&limit=1", id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase
            .select(
                APPOINTMENTS_TABLE,
                &format!("idempotency_key=eq.{}&limit=1", urlencoding::encode(key)),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_active_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = format!(
            "practitioner_id=eq.{}&start_time=lt.{}&end_time=gt.{}&status=in.(scheduled,confirmed)&archived=eq.false&order=start_time.asc",
            practitioner_id,
            rfc3339(to),
            rfc3339(from),
        );

        let rows: Vec<Appointment> = self.supabase.select(APPOINTMENTS_TABLE, &query).await?;
        debug!("Loaded {} active appointments for practitioner {}", rows.len(), practitioner_id);
        Ok(rows)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let row = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;

        let rows: Vec<Appointment> = self.supabase.insert(APPOINTMENTS_TABLE, row).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))
    }

    async fn update_times(
        &self,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        self.patch(id, json!({
            "start_time": rfc3339(start_time),
            "end_time": rfc3339(end_time),
            "updated_at": rfc3339(Utc::now()),
        })).await
    }

    async fn update_status(&self, id: Uuid, status: AppointmentStatus) -> Result<(), AppointmentError> {
        self.patch(id, json!({
            "status": status,
            "updated_at": rfc3339(Utc::now()),
        })).await
    }

    async fn set_provider_event(&self, id: Uuid, event_id: Option<&str>) -> Result<(), AppointmentError> {
        self.patch(id, json!({
            "provider_event_id": event_id,
            "updated_at": rfc3339(Utc::now()),
        })).await
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Process-local ledger used for development and tests.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, appointment: Appointment) {
        self.appointments.write().await.insert(appointment.id, appointment);
    }

    pub async fn all(&self) -> Vec<Appointment> {
        let mut rows: Vec<Appointment> = self.appointments.read().await.values().cloned().collect();
        rows.sort_by_key(|a| a.start_time);
        rows
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> Result<(), AppointmentError>
    where
        F: FnOnce(&mut Appointment),
    {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments.get_mut(&id).ok_or(AppointmentError::NotFound)?;
        f(appointment);
        appointment.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await
            .values()
            .find(|a| a.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn find_active_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rows: Vec<Appointment> = self.appointments.read().await
            .values()
            .filter(|a| a.practitioner_id == practitioner_id && a.is_active())
            .filter(|a| intervals_overlap(a.start_time, a.end_time, from, to))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.start_time);
        Ok(rows)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        if let Some(key) = appointment.idempotency_key.as_deref() {
            if appointments.values().any(|a| a.idempotency_key.as_deref() == Some(key)) {
                return Err(AppointmentError::DuplicateKey(key.to_string()));
            }
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_times(
        &self,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        self.modify(id, |a| {
            a.start_time = start_time;
            a.end_time = end_time;
        }).await
    }

    async fn update_status(&self, id: Uuid, status: AppointmentStatus) -> Result<(), AppointmentError> {
        self.modify(id, |a| a.status = status).await
    }

    async fn set_provider_event(&self, id: Uuid, event_id: Option<&str>) -> Result<(), AppointmentError> {
        let event_id = event_id.map(str::to_string);
        self.modify(id, |a| a.provider_event_id = event_id).await
    }
}
