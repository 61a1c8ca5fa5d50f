use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};

use crate::error::CalendarSyncError;
use crate::models::{Calendar, IntegrationStatus, Subscription};

const CALENDARS_TABLE: &str = "practitioner_calendars";

/// Persistent sync state, one row per practitioner calendar.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Calendar>, CalendarSyncError>;

    async fn find_by_practitioner(&self, practitioner_id: Uuid) -> Result<Option<Calendar>, CalendarSyncError>;

    async fn get(&self, id: Uuid) -> Result<Option<Calendar>, CalendarSyncError>;

    async fn list(&self) -> Result<Vec<Calendar>, CalendarSyncError>;

    async fn insert(&self, calendar: Calendar) -> Result<Calendar, CalendarSyncError>;

    async fn update_sync_token(&self, id: Uuid, token: Option<&str>) -> Result<(), CalendarSyncError>;

    /// Replaces the stored channel reference in one write; `None` clears it.
    async fn update_subscription(&self, id: Uuid, subscription: Option<&Subscription>) -> Result<(), CalendarSyncError>;

    async fn set_status(&self, id: Uuid, status: IntegrationStatus) -> Result<(), CalendarSyncError>;

    async fn delete(&self, id: Uuid) -> Result<(), CalendarSyncError>;
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ==============================================================================
// SUPABASE-BACKED STORE
// ==============================================================================

pub struct SupabaseCalendarStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseCalendarStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn first(&self, query: String) -> Result<Option<Calendar>, CalendarSyncError> {
        let rows: Vec<Calendar> = self.supabase.select(CALENDARS_TABLE, &format!("{}&limit=1", query)).await?;
        Ok(rows.into_iter().next())
    }

    async fn patch(&self, id: Uuid, mut patch: serde_json::Value) -> Result<(), CalendarSyncError> {
        patch["updated_at"] = json!(rfc3339(Utc::now()));
        let touched = self.supabase.update(CALENDARS_TABLE, &format!("id=eq.{}", id), patch).await?;
        if touched == 0 {
            return Err(CalendarSyncError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for SupabaseCalendarStore {
    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Calendar>, CalendarSyncError> {
        self.first(format!("subscription_id=eq.{}", urlencoding::encode(subscription_id))).await
    }

    async fn find_by_practitioner(&self, practitioner_id: Uuid) -> Result<Option<Calendar>, CalendarSyncError> {
        self.first(format!("practitioner_id=eq.{}", practitioner_id)).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Calendar>, CalendarSyncError> {
        self.first(format!("id=eq.{}", id)).await
    }

    async fn list(&self) -> Result<Vec<Calendar>, CalendarSyncError> {
        Ok(self.supabase.select(CALENDARS_TABLE, "order=created_at.asc").await?)
    }

    async fn insert(&self, calendar: Calendar) -> Result<Calendar, CalendarSyncError> {
        let row = serde_json::to_value(&calendar).map_err(DatabaseError::from)?;
        let rows: Vec<Calendar> = self.supabase.insert(CALENDARS_TABLE, row).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CalendarSyncError::Store(DatabaseError::Decode("Insert returned no row".to_string())))
    }

    async fn update_sync_token(&self, id: Uuid, token: Option<&str>) -> Result<(), CalendarSyncError> {
        self.patch(id, json!({ "sync_token": token })).await
    }

    async fn update_subscription(&self, id: Uuid, subscription: Option<&Subscription>) -> Result<(), CalendarSyncError> {
        self.patch(id, json!({
            "subscription_id": subscription.map(|s| s.id.as_str()),
            "subscription_resource_id": subscription.map(|s| s.resource_id.as_str()),
            "subscription_expires_at": subscription.and_then(|s| s.expires_at).map(rfc3339),
        })).await
    }

    async fn set_status(&self, id: Uuid, status: IntegrationStatus) -> Result<(), CalendarSyncError> {
        self.patch(id, json!({ "integration_status": status })).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), CalendarSyncError> {
        self.supabase.delete(CALENDARS_TABLE, &format!("id=eq.{}", id)).await?;
        Ok(())
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryCalendarStore {
    calendars: RwLock<HashMap<Uuid, Calendar>>,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> Result<(), CalendarSyncError>
    where
        F: FnOnce(&mut Calendar),
    {
        let mut calendars = self.calendars.write().await;
        let calendar = calendars
            .get_mut(&id)
            .ok_or_else(|| CalendarSyncError::NotFound(id.to_string()))?;
        f(calendar);
        calendar.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn find_by_subscription(&self, subscription_id: &str) -> Result<Option<Calendar>, CalendarSyncError> {
        Ok(self.calendars.read().await
            .values()
            .find(|c| c.subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_practitioner(&self, practitioner_id: Uuid) -> Result<Option<Calendar>, CalendarSyncError> {
        Ok(self.calendars.read().await
            .values()
            .find(|c| c.practitioner_id == practitioner_id)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Calendar>, CalendarSyncError> {
        Ok(self.calendars.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Calendar>, CalendarSyncError> {
        let mut calendars: Vec<Calendar> = self.calendars.read().await.values().cloned().collect();
        calendars.sort_by_key(|c| c.created_at);
        Ok(calendars)
    }

    async fn insert(&self, calendar: Calendar) -> Result<Calendar, CalendarSyncError> {
        let mut calendars = self.calendars.write().await;
        if calendars.values().any(|c| c.practitioner_id == calendar.practitioner_id) {
            return Err(CalendarSyncError::Store(DatabaseError::Duplicate(format!(
                "Practitioner {} already has a calendar",
                calendar.practitioner_id
            ))));
        }
        calendars.insert(calendar.id, calendar.clone());
        Ok(calendar)
    }

    async fn update_sync_token(&self, id: Uuid, token: Option<&str>) -> Result<(), CalendarSyncError> {
        let token = token.map(str::to_string);
        self.modify(id, |c| c.sync_token = token).await
    }

    async fn update_subscription(&self, id: Uuid, subscription: Option<&Subscription>) -> Result<(), CalendarSyncError> {
        let subscription = subscription.cloned();
        self.modify(id, |c| {
            c.subscription_id = subscription.as_ref().map(|s| s.id.clone());
            c.subscription_resource_id = subscription.as_ref().map(|s| s.resource_id.clone());
            c.subscription_expires_at = subscription.and_then(|s| s.expires_at);
        }).await
    }

    async fn set_status(&self, id: Uuid, status: IntegrationStatus) -> Result<(), CalendarSyncError> {
        self.modify(id, |c| c.integration_status = status).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), CalendarSyncError> {
        self.calendars.write().await.remove(&id);
        Ok(())
    }
}
