mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, SessionType};
use appointment_cell::store::AppointmentStore;
use calendar_sync_cell::error::{CalendarSyncError, ProviderError};
use calendar_sync_cell::models::{BusyInterval, EventPage, EventQuery, EventStatus, ProviderEvent, SyncWindows};
use calendar_sync_cell::services::{IncrementalSyncEngine, SyncRegistry};
use calendar_sync_cell::store::CalendarStore;

use common::Fixture;

fn engine(fixture: &Fixture, registry: Arc<SyncRegistry>) -> IncrementalSyncEngine {
    IncrementalSyncEngine::new(
        fixture.calendars.clone(),
        fixture.appointments.clone(),
        fixture.provider.clone(),
        registry,
        SyncWindows::default(),
    )
}

fn linked_event(appointment: &Appointment, status: EventStatus) -> ProviderEvent {
    ProviderEvent {
        id: format!("evt-{}", appointment.id),
        status,
        summary: None,
        start: Some(appointment.start_time),
        end: Some(appointment.end_time),
        appointment_id: Some(appointment.id),
    }
}

#[tokio::test]
async fn test_first_sync_uses_bounded_look_back_and_stores_token() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    let now = Utc::now();

    let result = engine(&fixture, Arc::new(SyncRegistry::default()))
        .sync_at(&calendar, now)
        .await
        .unwrap();

    assert!(result.full_resync);
    let calls = fixture.provider.list_calls();
    assert_eq!(calls.len(), 1);
    assert_matches!(&calls[0], EventQuery::Window { time_min } if *time_min == now - Duration::days(30));

    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_token.as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn test_token_gone_falls_back_to_full_resync() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    fixture.calendars.update_sync_token(calendar.id, Some("stale-token")).await.unwrap();
    let calendar = fixture.calendars.get(calendar.id).await.unwrap().unwrap();

    fixture.provider.push_page(Err(ProviderError::TokenGone));
    fixture.provider.push_page(Ok(EventPage {
        events: Vec::new(),
        next_sync_token: Some("rebuilt-token".to_string()),
    }));

    let registry = Arc::new(SyncRegistry::default());
    let result = engine(&fixture, registry.clone()).sync(&calendar).await.unwrap();

    assert!(result.full_resync);
    let calls = fixture.provider.list_calls();
    assert_eq!(calls.len(), 2);
    assert_matches!(&calls[0], EventQuery::Delta { sync_token } if sync_token == "stale-token");
    assert_matches!(&calls[1], EventQuery::Window { .. });

    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_token.as_deref(), Some("rebuilt-token"));
    assert_eq!(registry.cached_token(calendar.id).as_deref(), Some("rebuilt-token"));
}

#[tokio::test]
async fn test_subsequent_sync_requests_delta_with_cached_token() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    let engine = engine(&fixture, Arc::new(SyncRegistry::default()));

    engine.sync(&calendar).await.unwrap();
    let second = engine.sync(&calendar).await.unwrap();

    assert!(!second.full_resync);
    let calls = fixture.provider.list_calls();
    assert_matches!(&calls[1], EventQuery::Delta { sync_token } if sync_token == "fresh-token");
}

#[tokio::test]
async fn test_provider_changes_are_applied_to_linked_appointments() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    let start = Utc::now() + Duration::days(2);

    let moved = Appointment::new(calendar.practitioner_id, None, start, start + Duration::hours(1), SessionType::Individual);
    let cancelled = Appointment::new(calendar.practitioner_id, None, start + Duration::hours(3), start + Duration::hours(4), SessionType::Individual);
    fixture.appointments.seed(moved.clone()).await;
    fixture.appointments.seed(cancelled.clone()).await;

    let mut moved_event = linked_event(&moved, EventStatus::Confirmed);
    moved_event.start = Some(start + Duration::hours(1));
    moved_event.end = Some(start + Duration::hours(2));

    let unrelated = ProviderEvent {
        id: "personal".to_string(),
        status: EventStatus::Confirmed,
        summary: Some("Dentist".to_string()),
        start: Some(start),
        end: Some(start + Duration::hours(1)),
        appointment_id: None,
    };
    let dangling = ProviderEvent {
        appointment_id: Some(Uuid::new_v4()),
        ..unrelated.clone()
    };

    fixture.provider.push_page(Ok(EventPage {
        events: vec![moved_event, linked_event(&cancelled, EventStatus::Cancelled), unrelated, dangling],
        next_sync_token: Some("t2".to_string()),
    }));

    let result = engine(&fixture, Arc::new(SyncRegistry::default())).sync(&calendar).await.unwrap();

    assert_eq!(result.events_processed, 4);
    assert_eq!(result.appointments_updated, 1);
    assert_eq!(result.appointments_cancelled, 1);

    let moved_now = fixture.appointments.get(moved.id).await.unwrap().unwrap();
    assert_eq!(moved_now.start_time, start + Duration::hours(1));
    let cancelled_now = fixture.appointments.get(cancelled.id).await.unwrap().unwrap();
    assert_eq!(cancelled_now.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_conflicts_flag_appointments_for_rescheduling() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    let start = Utc::now() + Duration::days(1);

    let unlinked = Appointment::new(calendar.practitioner_id, None, start, start + Duration::hours(1), SessionType::Individual);
    fixture.appointments.seed(unlinked.clone()).await;
    *fixture.provider.busy.lock().unwrap() = vec![BusyInterval::new(start + Duration::minutes(30), start + Duration::hours(2))];

    let result = engine(&fixture, Arc::new(SyncRegistry::default())).sync(&calendar).await.unwrap();

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].appointment_id, unlinked.id);
    let flagged = fixture.appointments.get(unlinked.id).await.unwrap().unwrap();
    assert_eq!(flagged.status, AppointmentStatus::Rescheduled);
}

#[tokio::test]
async fn test_conflict_detection_failure_is_fail_open() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    *fixture.provider.busy_error.lock().unwrap() = Some(ProviderError::Timeout("freeBusy".to_string()));

    let result = engine(&fixture, Arc::new(SyncRegistry::default())).sync(&calendar).await.unwrap();

    assert!(result.conflicts.is_empty());
    assert!(result.is_success());
    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_token.as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn test_listing_failure_propagates_without_touching_token() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;
    fixture.provider.push_page(Err(ProviderError::RateLimited("slow down".to_string())));

    let err = engine(&fixture, Arc::new(SyncRegistry::default())).sync(&calendar).await.unwrap_err();

    assert_matches!(err, CalendarSyncError::Provider(ProviderError::RateLimited(_)));
    assert!(err.is_retryable());
    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert!(stored.sync_token.is_none());
}
