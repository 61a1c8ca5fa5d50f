// libs/calendar-sync-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CalendarSyncError;

// ==============================================================================
// CALENDAR & SUBSCRIPTION
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Pending,
    Active,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Active => "active",
            IntegrationStatus::Error => "error",
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One practitioner's calendar at the provider plus its sync bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calendar {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub provider_calendar_id: String,
    pub integration_status: IntegrationStatus,
    pub subscription_id: Option<String>,
    pub subscription_resource_id: Option<String>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub sync_token: Option<String>,
    pub shared_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Calendar {
    pub fn new(practitioner_id: Uuid, provider_calendar_id: impl Into<String>, shared_email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            practitioner_id,
            provider_calendar_id: provider_calendar_id.into(),
            integration_status: IntegrationStatus::Pending,
            subscription_id: None,
            subscription_resource_id: None,
            subscription_expires_at: None,
            sync_token: None,
            shared_email,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.integration_status == IntegrationStatus::Active
    }

    /// True when a subscription exists and lapses within `window` of `now`.
    /// A subscription with no recorded expiry is treated as lapsing.
    pub fn subscription_expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.subscription_id.is_some()
            && self.subscription_expires_at.map_or(true, |expires| expires <= now + window)
    }

    pub fn channel_state(&self, now: DateTime<Utc>, window: Duration) -> ChannelState {
        if self.integration_status == IntegrationStatus::Error {
            ChannelState::Error
        } else if self.subscription_id.is_none() {
            ChannelState::None
        } else if self.subscription_expires_within(now, window) {
            ChannelState::Expiring
        } else {
            ChannelState::Active
        }
    }
}

/// A push-notification channel registered with the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub resource_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    None,
    Active,
    Expiring,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub calendar_id: Uuid,
    pub practitioner_id: Uuid,
    pub subscription_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: ChannelState,
}

impl SubscriptionSummary {
    pub fn of(calendar: &Calendar, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            calendar_id: calendar.id,
            practitioner_id: calendar.practitioner_id,
            subscription_id: calendar.subscription_id.clone(),
            expires_at: calendar.subscription_expires_at,
            state: calendar.channel_state(now, window),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub calendar_id: Uuid,
    pub error: String,
}

/// Per-calendar outcome of a renewal or recreation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelReport {
    pub examined: usize,
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<ChannelFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHealth {
    pub total: usize,
    pub errored: usize,
    pub error_ratio: f64,
    pub healthy: bool,
}

// ==============================================================================
// WEBHOOK NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Handshake sent when a channel is created.
    Sync,
    Exists,
    NotExists,
}

impl FromStr for ResourceState {
    type Err = CalendarSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(ResourceState::Sync),
            "exists" => Ok(ResourceState::Exists),
            "not_exists" => Ok(ResourceState::NotExists),
            other => Err(CalendarSyncError::Validation(format!("Unknown resource state '{}'", other))),
        }
    }
}

pub const HEADER_CHANNEL_ID: &str = "X-Goog-Channel-ID";
pub const HEADER_RESOURCE_ID: &str = "X-Goog-Resource-ID";
pub const HEADER_RESOURCE_STATE: &str = "X-Goog-Resource-State";
pub const HEADER_RESOURCE_URI: &str = "X-Goog-Resource-URI";
pub const HEADER_CHANNEL_EXPIRATION: &str = "X-Goog-Channel-Expiration";
pub const HEADER_CHANNEL_TOKEN: &str = "X-Goog-Channel-Token";
pub const HEADER_MESSAGE_NUMBER: &str = "X-Goog-Message-Number";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub channel_id: String,
    pub resource_id: String,
    pub resource_state: ResourceState,
    pub resource_uri: String,
    pub channel_expiration: Option<String>,
    pub channel_token: Option<String>,
    pub message_number: Option<u64>,
}

impl WebhookNotification {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CalendarSyncError> {
        let optional = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let required = |name: &'static str| optional(name).ok_or(CalendarSyncError::MissingField(name));

        Ok(Self {
            channel_id: required(HEADER_CHANNEL_ID)?,
            resource_id: required(HEADER_RESOURCE_ID)?,
            resource_state: required(HEADER_RESOURCE_STATE)?.parse()?,
            resource_uri: required(HEADER_RESOURCE_URI)?,
            channel_expiration: optional(HEADER_CHANNEL_EXPIRATION),
            channel_token: optional(HEADER_CHANNEL_TOKEN),
            message_number: optional(HEADER_MESSAGE_NUMBER).and_then(|n| n.parse().ok()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub calendar_id: Option<Uuid>,
    pub events_processed: usize,
    pub appointments_updated: usize,
    pub appointments_cancelled: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub full_resync: bool,
    /// Another sync for the same calendar was already running.
    pub skipped: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl SyncResult {
    pub fn for_calendar(calendar_id: Uuid) -> Self {
        Self {
            calendar_id: Some(calendar_id),
            ..Self::default()
        }
    }

    pub fn skipped(calendar_id: Uuid) -> Self {
        Self {
            skipped: true,
            message: Some("Skipped, calendar is already being synced".to_string()),
            ..Self::for_calendar(calendar_id)
        }
    }

    pub fn unresolved(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn acknowledged(calendar_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::for_calendar(calendar_id)
        }
    }

    pub fn failed(calendar_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_calendar(calendar_id)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ==============================================================================
// PROVIDER EVENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEvent {
    pub id: String,
    pub status: EventStatus,
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Local appointment this event mirrors, if any.
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<ProviderEvent>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EventQuery {
    Delta { sync_token: String },
    Window { time_min: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub attendee_emails: Vec<String>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), CalendarSyncError> {
        if self.summary.trim().is_empty() {
            return Err(CalendarSyncError::Validation("Event summary is required".to_string()));
        }
        if self.end <= self.start {
            return Err(CalendarSyncError::Validation("Event end must be after start".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub appointment_id: Uuid,
    pub practitioner_id: Uuid,
    pub interval: BusyInterval,
    pub detected_at: DateTime<Utc>,
}

// ==============================================================================
// POLICIES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SyncWindows {
    pub look_back: Duration,
    pub look_ahead: Duration,
}

impl Default for SyncWindows {
    fn default() -> Self {
        Self {
            look_back: Duration::days(30),
            look_ahead: Duration::days(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    pub renewal_window: Duration,
    pub error_threshold: f64,
    /// Lifetime requested for new push channels.
    pub channel_ttl: Duration,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            renewal_window: Duration::hours(24),
            error_threshold: 0.10,
            channel_ttl: Duration::days(7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_complete_notification() {
        let map = headers(&[
            (HEADER_CHANNEL_ID, "chan-1"),
            (HEADER_RESOURCE_ID, "res-1"),
            (HEADER_RESOURCE_STATE, "exists"),
            (HEADER_RESOURCE_URI, "https://provider.test/calendars/c/events"),
            (HEADER_MESSAGE_NUMBER, "42"),
        ]);

        let notification = WebhookNotification::from_headers(&map).unwrap();
        assert_eq!(notification.resource_state, ResourceState::Exists);
        assert_eq!(notification.message_number, Some(42));
        assert!(notification.channel_token.is_none());
    }

    #[test]
    fn rejects_missing_or_unknown_fields() {
        let missing = headers(&[(HEADER_CHANNEL_ID, "chan-1"), (HEADER_RESOURCE_STATE, "exists")]);
        assert!(matches!(
            WebhookNotification::from_headers(&missing),
            Err(CalendarSyncError::MissingField(HEADER_RESOURCE_ID))
        ));

        let bad_state = headers(&[
            (HEADER_CHANNEL_ID, "chan-1"),
            (HEADER_RESOURCE_ID, "res-1"),
            (HEADER_RESOURCE_STATE, "deleted"),
            (HEADER_RESOURCE_URI, "uri"),
        ]);
        assert!(matches!(
            WebhookNotification::from_headers(&bad_state),
            Err(CalendarSyncError::Validation(_))
        ));
    }

    #[test]
    fn channel_state_follows_expiry_window() {
        let now = Utc::now();
        let mut calendar = Calendar::new(Uuid::new_v4(), "cal", None);
        calendar.integration_status = IntegrationStatus::Active;
        assert_eq!(calendar.channel_state(now, Duration::hours(24)), ChannelState::None);

        calendar.subscription_id = Some("chan".into());
        calendar.subscription_expires_at = Some(now + Duration::hours(30));
        assert_eq!(calendar.channel_state(now, Duration::hours(24)), ChannelState::Active);

        calendar.subscription_expires_at = Some(now + Duration::hours(20));
        assert_eq!(calendar.channel_state(now, Duration::hours(24)), ChannelState::Expiring);

        calendar.integration_status = IntegrationStatus::Error;
        assert_eq!(calendar.channel_state(now, Duration::hours(24)), ChannelState::Error);
    }
}
