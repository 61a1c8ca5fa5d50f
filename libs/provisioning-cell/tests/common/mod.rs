#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use calendar_sync_cell::error::ProviderError;
use calendar_sync_cell::models::{
    BusyInterval, ChannelPolicy, EventDraft, EventPage, EventQuery, ProviderEvent, Subscription,
};
use calendar_sync_cell::provider::CalendarProvider;
use calendar_sync_cell::services::{ChannelLifecycleManager, SyncMetrics, SyncRegistry};
use calendar_sync_cell::store::InMemoryCalendarStore;
use provisioning_cell::directory::{InMemoryPractitionerDirectory, PractitionerDirectory};
use provisioning_cell::models::Practitioner;
use provisioning_cell::notifier::{Notification, Notifier};
use provisioning_cell::services::{ProvisioningWorkflow, Sleeper};
use provisioning_cell::ProvisionError;
use shared_database::DatabaseError;

/// Provider double tracking the calendars it holds.
#[derive(Default)]
pub struct FakeProvider {
    pub calendars: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub rejected_emails: Mutex<HashSet<String>>,
    pub transient_create_failures: AtomicU32,
    pub fail_delete: AtomicBool,
    pub fail_watch: AtomicBool,
    pub watched: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_email(&self, email: &str) {
        self.rejected_emails.lock().unwrap().insert(email.to_string());
    }

    pub fn holds(&self, provider_calendar_id: &str) -> bool {
        self.calendars.lock().unwrap().contains(provider_calendar_id)
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn held_count(&self) -> usize {
        self.calendars.lock().unwrap().len()
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_events(&self, _: &str, _: EventQuery) -> Result<EventPage, ProviderError> {
        Ok(EventPage::default())
    }

    async fn query_busy(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<BusyInterval>, ProviderError> {
        Ok(Vec::new())
    }

    async fn create_event(&self, _: &str, _: &EventDraft) -> Result<ProviderEvent, ProviderError> {
        Err(ProviderError::InvalidRequest("not scripted".into()))
    }

    async fn update_event(&self, _: &str, _: &str, _: &EventDraft) -> Result<ProviderEvent, ProviderError> {
        Err(ProviderError::InvalidRequest("not scripted".into()))
    }

    async fn delete_event(&self, _: &str, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn create_calendar(&self, _: &str, _: &str, share_with: Option<&str>) -> Result<String, ProviderError> {
        let remaining = self.transient_create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::RateLimited("Rate Limit Exceeded".into()));
        }

        let id = format!("cal-{}@group.calendar.test", Uuid::new_v4());
        self.calendars.lock().unwrap().insert(id.clone());
        self.created.lock().unwrap().push(id.clone());

        // Sharing happens after creation; a rejected share removes the calendar again.
        if let Some(email) = share_with {
            if self.rejected_emails.lock().unwrap().contains(email) {
                self.calendars.lock().unwrap().remove(&id);
                self.deleted.lock().unwrap().push(id);
                return Err(ProviderError::InvalidRequest(format!("Invalid email: {}", email)));
            }
        }

        Ok(id)
    }

    async fn calendar_exists(&self, calendar_id: &str) -> Result<bool, ProviderError> {
        Ok(self.holds(calendar_id))
    }

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::Server { status: 500, message: "backend error".into() });
        }
        self.calendars.lock().unwrap().remove(calendar_id);
        self.deleted.lock().unwrap().push(calendar_id.to_string());
        Ok(())
    }

    async fn watch(&self, _: &str, channel_id: &str) -> Result<Subscription, ProviderError> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(ProviderError::InvalidRequest("webhook address not verified".into()));
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

/// Directory whose calendar assignment can be made to fail while clearing
/// still works.
#[derive(Default)]
pub struct FlakyDirectory {
    pub inner: InMemoryPractitionerDirectory,
    pub fail_assign: AtomicBool,
}

#[async_trait]
impl PractitionerDirectory for FlakyDirectory {
    async fn get(&self, id: Uuid) -> Result<Option<Practitioner>, DatabaseError> {
        self.inner.get(id).await
    }

    async fn list_practitioners(&self) -> Result<Vec<Practitioner>, DatabaseError> {
        self.inner.list_practitioners().await
    }

    async fn set_calendar(&self, id: Uuid, calendar_id: Option<Uuid>) -> Result<(), DatabaseError> {
        if calendar_id.is_some() && self.fail_assign.load(Ordering::SeqCst) {
            return Err(DatabaseError::Rejected {
                status: 400,
                message: "profile update rejected".into(),
            });
        }
        self.inner.set_calendar(id, calendar_id).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ProvisionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProvisionError::Notification("relay down".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Records requested delays. Waits only when `advance_clock` is set, which
/// tests pair with a paused tokio clock.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
    pub advance_clock: AtomicBool,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        if self.advance_clock.load(Ordering::SeqCst) {
            tokio::time::sleep(duration).await;
        }
    }
}

pub struct Fixture {
    pub calendars: Arc<InMemoryCalendarStore>,
    pub provider: Arc<FakeProvider>,
    pub directory: Arc<FlakyDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub registry: Arc<SyncRegistry>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            calendars: Arc::new(InMemoryCalendarStore::new()),
            provider: FakeProvider::new(),
            directory: Arc::new(FlakyDirectory::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            registry: Arc::new(SyncRegistry::default()),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    pub fn workflow(&self) -> ProvisioningWorkflow {
        let lifecycle = Arc::new(ChannelLifecycleManager::new(
            self.calendars.clone(),
            self.provider.clone(),
            self.registry.clone(),
            Arc::new(SyncMetrics::new()),
            ChannelPolicy::default(),
        ));

        ProvisioningWorkflow::new(
            self.calendars.clone(),
            self.provider.clone(),
            self.directory.clone(),
            self.notifier.clone(),
            lifecycle,
            self.registry.clone(),
        )
        .with_sleeper(self.sleeper.clone())
    }

    pub async fn practitioner(&self, email: &str) -> Practitioner {
        self.profile(email, "practitioner").await
    }

    pub async fn profile(&self, email: &str, role: &str) -> Practitioner {
        let practitioner = Practitioner {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            full_name: Some(format!("Dr. {}", email.split('@').next().unwrap_or("x"))),
            role: Some(role.to_string()),
            calendar_id: None,
        };
        self.directory.inner.seed(practitioner.clone()).await;
        practitioner
    }

    pub async fn profile_calendar(&self, practitioner_id: Uuid) -> Option<Uuid> {
        self.directory.inner.get(practitioner_id).await.unwrap().and_then(|p| p.calendar_id)
    }
}

