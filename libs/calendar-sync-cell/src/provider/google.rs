use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::ProviderError;
use crate::models::{BusyInterval, ChannelPolicy, EventDraft, EventPage, EventQuery, EventStatus, ProviderEvent, Subscription};
use crate::provider::CalendarProvider;

const APPOINTMENT_PROPERTY: &str = "appointment_id";
const PAGE_SIZE: &str = "250";

// ==============================================================================
// WIRE TYPES
// ==============================================================================

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GoogleEventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GoogleExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<GoogleEventDateTime>,
    #[serde(default)]
    end: Option<GoogleEventDateTime>,
    #[serde(default)]
    extended_properties: Option<GoogleExtendedProperties>,
}

impl From<GoogleEvent> for ProviderEvent {
    fn from(event: GoogleEvent) -> Self {
        let status = match event.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };

        let appointment_id = event
            .extended_properties
            .as_ref()
            .and_then(|props| props.private.get(APPOINTMENT_PROPERTY))
            .and_then(|id| Uuid::parse_str(id).ok());

        ProviderEvent {
            id: event.id,
            status,
            summary: event.summary,
            // All-day entries carry only `date` and never mirror an appointment.
            start: event.start.and_then(|s| s.date_time),
            end: event.end.and_then(|e| e.date_time),
            appointment_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FreeBusySpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusySpan>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct CreatedCalendar {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    id: String,
    resource_id: String,
    /// Milliseconds since the epoch, as a string.
    expiration: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: String,
}

// ==============================================================================
// CLIENT
// ==============================================================================

/// Google Calendar v3 REST client.
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
    access_token: String,
    webhook_url: String,
    webhook_token: Option<String>,
    channel_ttl: Duration,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.provider_timeout_seconds.max(1)))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build provider HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.google_calendar_api_base_url.trim_end_matches('/').to_string(),
            access_token: config.google_calendar_access_token.clone(),
            webhook_url: config.calendar_webhook_url.clone(),
            webhook_token: config.calendar_webhook_token.clone(),
            channel_ttl: ChannelPolicy::default().channel_ttl,
        }
    }

    fn calendar_path(calendar_id: &str) -> String {
        format!("/calendars/{}", urlencoding::encode(calendar_id))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Calling provider: {} {}", method, url);
        self.client.request(method, url).bearer_auth(&self.access_token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = check(request.send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Unexpected(format!("Failed to parse provider response: {}", e)))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ProviderError> {
        check(request.send().await?).await.map(|_| ())
    }

    fn event_body(draft: &EventDraft) -> Value {
        let mut body = json!({
            "summary": draft.summary,
            "description": draft.description,
            "start": GoogleEventDateTime { date_time: Some(draft.start), date: None },
            "end": GoogleEventDateTime { date_time: Some(draft.end), date: None },
        });

        if let Some(appointment_id) = draft.appointment_id {
            body["extendedProperties"] = json!({
                "private": { APPOINTMENT_PROPERTY: appointment_id.to_string() }
            });
        }
        if !draft.attendee_emails.is_empty() {
            body["attendees"] = draft.attendee_emails.iter()
                .map(|email| json!({ "email": email }))
                .collect();
        }

        body
    }
}

/// Maps a non-success response onto the provider error taxonomy.
async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, reason) = match serde_json::from_str::<GoogleErrorEnvelope>(&body) {
        Ok(envelope) => {
            let reason = envelope.error.errors.into_iter().next().map(|e| e.reason).unwrap_or_default();
            (envelope.error.message, reason)
        }
        Err(_) => (body, String::new()),
    };

    warn!("Provider error ({}): {} {}", status, reason, message);

    Err(match status {
        StatusCode::GONE => ProviderError::TokenGone,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        StatusCode::FORBIDDEN => match reason.as_str() {
            "rateLimitExceeded" | "userRateLimitExceeded" => ProviderError::RateLimited(message),
            "quotaExceeded" | "dailyLimitExceeded" => ProviderError::QuotaExceeded(message),
            _ => ProviderError::Unauthorized(message),
        },
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(message),
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::CONFLICT => ProviderError::Duplicate(message),
        StatusCode::BAD_REQUEST => ProviderError::InvalidRequest(message),
        s if s.is_server_error() => ProviderError::Server { status: s.as_u16(), message },
        _ => ProviderError::Unexpected(format!("{}: {}", status, message)),
    })
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Deleting something that is already gone counts as success.
fn ignore_missing(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    match result {
        Err(ProviderError::NotFound(_)) | Err(ProviderError::TokenGone) => Ok(()),
        other => other,
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn list_events(&self, calendar_id: &str, query: EventQuery) -> Result<EventPage, ProviderError> {
        let path = format!("{}/events", Self::calendar_path(calendar_id));
        let mut page = EventPage::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("maxResults", PAGE_SIZE.to_string()),
                ("singleEvents", "true".to_string()),
            ];
            match &query {
                EventQuery::Delta { sync_token } => params.push(("syncToken", sync_token.clone())),
                EventQuery::Window { time_min } => {
                    params.push(("timeMin", rfc3339(*time_min)));
                    params.push(("showDeleted", "true".to_string()));
                }
            }
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response: GoogleEventsResponse = self
                .send_json(self.request(Method::GET, &path).query(&params))
                .await?;

            page.events.extend(response.items.into_iter().map(ProviderEvent::from));

            match response.next_page_token {
                Some(next) => page_token = Some(next),
                None => {
                    page.next_sync_token = response.next_sync_token;
                    break;
                }
            }
        }

        debug!("Fetched {} events for calendar {}", page.events.len(), calendar_id);
        Ok(page)
    }

    async fn query_busy(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError> {
        let body = json!({
            "timeMin": rfc3339(from),
            "timeMax": rfc3339(to),
            "items": [{ "id": calendar_id }],
        });

        let mut response: FreeBusyResponse = self
            .send_json(self.request(Method::POST, "/freeBusy").json(&body))
            .await?;

        let calendar = response
            .calendars
            .remove(calendar_id)
            .ok_or_else(|| ProviderError::Unexpected(format!("No free/busy data for {}", calendar_id)))?;

        if let Some(first) = calendar.errors.first() {
            return Err(ProviderError::NotFound(first.to_string()));
        }

        Ok(calendar.busy.into_iter().map(|span| BusyInterval::new(span.start, span.end)).collect())
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<ProviderEvent, ProviderError> {
        let path = format!("{}/events", Self::calendar_path(calendar_id));
        let event: GoogleEvent = self
            .send_json(self.request(Method::POST, &path).json(&Self::event_body(draft)))
            .await?;
        Ok(event.into())
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<ProviderEvent, ProviderError> {
        let path = format!("{}/events/{}", Self::calendar_path(calendar_id), urlencoding::encode(event_id));
        let event: GoogleEvent = self
            .send_json(self.request(Method::PUT, &path).json(&Self::event_body(draft)))
            .await?;
        Ok(event.into())
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), ProviderError> {
        let path = format!("{}/events/{}", Self::calendar_path(calendar_id), urlencoding::encode(event_id));
        ignore_missing(self.send_empty(self.request(Method::DELETE, &path)).await)
    }

    async fn create_calendar(
        &self,
        summary: &str,
        time_zone: &str,
        share_with: Option<&str>,
    ) -> Result<String, ProviderError> {
        let created: CreatedCalendar = self
            .send_json(
                self.request(Method::POST, "/calendars")
                    .json(&json!({ "summary": summary, "timeZone": time_zone })),
            )
            .await?;

        if let Some(email) = share_with {
            let acl_path = format!("{}/acl", Self::calendar_path(&created.id));
            let shared = self
                .send_empty(
                    self.request(Method::POST, &acl_path)
                        .query(&[("sendNotifications", "false")])
                        .json(&json!({
                            "role": "writer",
                            "scope": { "type": "user", "value": email }
                        })),
                )
                .await;

            // Never leave an unshared calendar behind.
            if let Err(e) = shared {
                warn!("Sharing calendar {} with {} failed, deleting it: {}", created.id, email, e);
                if let Err(cleanup) = self.delete_calendar(&created.id).await {
                    error!("Failed to delete unshared calendar {}: {}", created.id, cleanup);
                }
                return Err(e);
            }
        }

        Ok(created.id)
    }

    async fn calendar_exists(&self, calendar_id: &str) -> Result<bool, ProviderError> {
        match self.send_empty(self.request(Method::GET, &Self::calendar_path(calendar_id))).await {
            Ok(()) => Ok(true),
            Err(ProviderError::NotFound(_)) | Err(ProviderError::TokenGone) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError> {
        ignore_missing(self.send_empty(self.request(Method::DELETE, &Self::calendar_path(calendar_id))).await)
    }

    async fn watch(&self, calendar_id: &str, channel_id: &str) -> Result<Subscription, ProviderError> {
        let path = format!("{}/events/watch", Self::calendar_path(calendar_id));
        let mut body = json!({
            "id": channel_id,
            "type": "web_hook",
            "address": self.webhook_url,
            "params": { "ttl": self.channel_ttl.num_seconds().to_string() },
        });
        if let Some(token) = &self.webhook_token {
            body["token"] = json!(token);
        }

        let response: WatchResponse = self
            .send_json(self.request(Method::POST, &path).json(&body))
            .await?;

        let expires_at = response
            .expiration
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(Subscription {
            id: response.id,
            resource_id: response.resource_id,
            expires_at,
            token: response.token,
        })
    }

    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), ProviderError> {
        ignore_missing(
            self.send_empty(
                self.request(Method::POST, "/channels/stop")
                    .json(&json!({ "id": channel_id, "resourceId": resource_id })),
            )
            .await,
        )
    }
}
