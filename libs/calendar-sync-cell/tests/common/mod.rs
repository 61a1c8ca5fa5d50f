#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use appointment_cell::store::InMemoryAppointmentStore;
use calendar_sync_cell::error::ProviderError;
use calendar_sync_cell::models::{
    BusyInterval, Calendar, EventDraft, EventPage, EventQuery, EventStatus, IntegrationStatus,
    ProviderEvent, Subscription,
};
use calendar_sync_cell::provider::CalendarProvider;
use calendar_sync_cell::store::{CalendarStore, InMemoryCalendarStore};

/// Scriptable provider double. Unscripted listings return an empty page with
/// token `"fresh-token"`.
#[derive(Default)]
pub struct FakeProvider {
    pub pages: Mutex<VecDeque<Result<EventPage, ProviderError>>>,
    pub list_calls: Mutex<Vec<EventQuery>>,
    pub list_delay: Mutex<Option<Duration>>,
    pub busy: Mutex<Vec<BusyInterval>>,
    pub busy_error: Mutex<Option<ProviderError>>,
    pub failing_watch: Mutex<HashSet<String>>,
    pub watched: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    pub created_events: Mutex<Vec<EventDraft>>,
    pub deleted_events: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, page: Result<EventPage, ProviderError>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn fail_watch_for(&self, provider_calendar_id: &str) {
        self.failing_watch.lock().unwrap().insert(provider_calendar_id.to_string());
    }

    pub fn list_calls(&self) -> Vec<EventQuery> {
        self.list_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_events(&self, _calendar_id: &str, query: EventQuery) -> Result<EventPage, ProviderError> {
        self.list_calls.lock().unwrap().push(query);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.pages.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(EventPage {
                events: Vec::new(),
                next_sync_token: Some("fresh-token".to_string()),
            })
        })
    }

    async fn query_busy(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<BusyInterval>, ProviderError> {
        if let Some(e) = self.busy_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.busy.lock().unwrap().clone())
    }

    async fn create_event(&self, _: &str, draft: &EventDraft) -> Result<ProviderEvent, ProviderError> {
        self.created_events.lock().unwrap().push(draft.clone());
        Ok(ProviderEvent {
            id: format!("evt-{}", self.created_events.lock().unwrap().len()),
            status: EventStatus::Confirmed,
            summary: Some(draft.summary.clone()),
            start: Some(draft.start),
            end: Some(draft.end),
            appointment_id: draft.appointment_id,
        })
    }

    async fn update_event(&self, _: &str, event_id: &str, draft: &EventDraft) -> Result<ProviderEvent, ProviderError> {
        Ok(ProviderEvent {
            id: event_id.to_string(),
            status: EventStatus::Confirmed,
            summary: Some(draft.summary.clone()),
            start: Some(draft.start),
            end: Some(draft.end),
            appointment_id: draft.appointment_id,
        })
    }

    async fn delete_event(&self, _: &str, event_id: &str) -> Result<(), ProviderError> {
        self.deleted_events.lock().unwrap().push(event_id.to_string());
        Ok(())
    }

    async fn create_calendar(&self, summary: &str, _: &str, _: Option<&str>) -> Result<String, ProviderError> {
        Ok(format!("{}@group.calendar.test", summary.to_lowercase().replace(' ', "-")))
    }

    async fn calendar_exists(&self, _: &str) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn delete_calendar(&self, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn watch(&self, calendar_id: &str, channel_id: &str) -> Result<Subscription, ProviderError> {
        if self.failing_watch.lock().unwrap().contains(calendar_id) {
            return Err(ProviderError::InvalidRequest("webhook address not verified".to_string()));
        }
        self.watched.lock().unwrap().push(channel_id.to_string());
        Ok(Subscription {
            id: channel_id.to_string(),
            resource_id: format!("res-{}", channel_id),
            expires_at: Some(Utc::now() + chrono::Duration::days(7)),
            token: None,
        })
    }

    async fn stop_channel(&self, channel_id: &str, _: &str) -> Result<(), ProviderError> {
        self.stopped.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }
}

pub struct Fixture {
    pub calendars: Arc<InMemoryCalendarStore>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub provider: Arc<FakeProvider>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            calendars: Arc::new(InMemoryCalendarStore::new()),
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            provider: FakeProvider::new(),
        }
    }

    pub async fn active_calendar(&self, subscription: Option<(&str, DateTime<Utc>)>) -> Calendar {
        let mut calendar = Calendar::new(Uuid::new_v4(), format!("cal-{}", Uuid::new_v4()), None);
        calendar.integration_status = IntegrationStatus::Active;
        if let Some((id, expires_at)) = subscription {
            calendar.subscription_id = Some(id.to_string());
            calendar.subscription_resource_id = Some(format!("res-{}", id));
            calendar.subscription_expires_at = Some(expires_at);
        }
        self.calendars.insert(calendar).await.unwrap()
    }
}
