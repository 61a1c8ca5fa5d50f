use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};
use shared_models::auth::ROLE_PRACTITIONER;

use crate::models::Practitioner;

const PROFILES_TABLE: &str = "profiles";
const PROFILE_COLUMNS: &str = "id,email,full_name,role,calendar_id";

/// Read/write access to practitioner profiles.
#[async_trait]
pub trait PractitionerDirectory: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Practitioner>, DatabaseError>;

    async fn list_practitioners(&self) -> Result<Vec<Practitioner>, DatabaseError>;

    /// Sets or clears the profile's calendar reference.
    async fn set_calendar(&self, id: Uuid, calendar_id: Option<Uuid>) -> Result<(), DatabaseError>;
}

// ==============================================================================
// SUPABASE-BACKED DIRECTORY
// ==============================================================================

pub struct SupabasePractitionerDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePractitionerDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PractitionerDirectory for SupabasePractitionerDirectory {
    async fn get(&self, id: Uuid) -> Result<Option<Practitioner>, DatabaseError> {
        let rows: Vec<Practitioner> = self.supabase
            .select(PROFILES_TABLE, &format!("id=eq.{}&select={}&limit=1", id, PROFILE_COLUMNS))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_practitioners(&self) -> Result<Vec<Practitioner>, DatabaseError> {
        let rows: Vec<Practitioner> = self.supabase
            .select(
                PROFILES_TABLE,
                &format!("role=eq.{}&select={}&order=email.asc", ROLE_PRACTITIONER, PROFILE_COLUMNS),
            )
            .await?;
        debug!("Loaded {} practitioner profiles", rows.len());
        Ok(rows)
    }

    async fn set_calendar(&self, id: Uuid, calendar_id: Option<Uuid>) -> Result<(), DatabaseError> {
        let touched = self.supabase
            .update(PROFILES_TABLE, &format!("id=eq.{}", id), json!({ "calendar_id": calendar_id }))
            .await?;

        if touched == 0 {
            return Err(DatabaseError::NotFound(format!("Profile {} not found", id)));
        }
        Ok(())
    }
}

// ==============================================================================
// IN-MEMORY DIRECTORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryPractitionerDirectory {
    profiles: RwLock<HashMap<Uuid, Practitioner>>,
}

impl InMemoryPractitionerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, practitioner: Practitioner) {
        self.profiles.write().await.insert(practitioner.id, practitioner);
    }
}

#[async_trait]
impl PractitionerDirectory for InMemoryPractitionerDirectory {
    async fn get(&self, id: Uuid) -> Result<Option<Practitioner>, DatabaseError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn list_practitioners(&self) -> Result<Vec<Practitioner>, DatabaseError> {
        let mut rows: Vec<Practitioner> = self.profiles.read().await
            .values()
            .filter(|p| p.is_practitioner())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(rows)
    }

    async fn set_calendar(&self, id: Uuid, calendar_id: Option<Uuid>) -> Result<(), DatabaseError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Profile {} not found", id)))?;
        profile.calendar_id = calendar_id;
        Ok(())
    }
}
