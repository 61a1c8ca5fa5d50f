pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::models::{BusyInterval, EventDraft, EventPage, EventQuery, ProviderEvent, Subscription};

pub use google::GoogleCalendarClient;

/// Operations the sync core needs from an external calendar provider.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Fetches every page of a delta or windowed listing; the page carries the
    /// continuation token issued with the last page.
    async fn list_events(&self, calendar_id: &str, query: EventQuery) -> Result<EventPage, ProviderError>;

    async fn query_busy(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError>;

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<ProviderEvent, ProviderError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<ProviderEvent, ProviderError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), ProviderError>;

    /// Creates a secondary calendar, optionally shared with `share_with`, and
    /// returns its provider id.
    async fn create_calendar(
        &self,
        summary: &str,
        time_zone: &str,
        share_with: Option<&str>,
    ) -> Result<String, ProviderError>;

    async fn calendar_exists(&self, calendar_id: &str) -> Result<bool, ProviderError>;

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError>;

    async fn watch(&self, calendar_id: &str, channel_id: &str) -> Result<Subscription, ProviderError>;

    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), ProviderError>;
}
