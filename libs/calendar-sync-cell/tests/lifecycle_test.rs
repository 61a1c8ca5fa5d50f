mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use calendar_sync_cell::models::{ChannelPolicy, ChannelState, IntegrationStatus};
use calendar_sync_cell::services::{ChannelLifecycleManager, SyncMetrics, SyncRegistry};
use calendar_sync_cell::store::CalendarStore;

use common::Fixture;

fn manager(fixture: &Fixture, registry: Arc<SyncRegistry>) -> ChannelLifecycleManager {
    ChannelLifecycleManager::new(
        fixture.calendars.clone(),
        fixture.provider.clone(),
        registry,
        Arc::new(SyncMetrics::new()),
        ChannelPolicy::default(),
    )
}

#[tokio::test]
async fn test_renewal_window_includes_20h_but_not_30h() {
    let fixture = Fixture::new();
    let now = Utc::now();
    let soon = fixture.active_calendar(Some(("chan-soon", now + Duration::hours(20)))).await;
    let later = fixture.active_calendar(Some(("chan-later", now + Duration::hours(30)))).await;

    let manager = manager(&fixture, Arc::new(SyncRegistry::default()));
    let candidates = manager.renewal_candidates(now).await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, soon.id);

    let report = manager.renew_expiring_at(now).await.unwrap();
    assert_eq!(report.succeeded, vec![soon.id]);

    let renewed = fixture.calendars.get(soon.id).await.unwrap().unwrap();
    assert_ne!(renewed.subscription_id.as_deref(), Some("chan-soon"));
    assert!(renewed.subscription_expires_at.unwrap() > now + Duration::days(6));
    assert_eq!(fixture.provider.stopped.lock().unwrap().clone(), vec!["chan-soon".to_string()]);

    let untouched = fixture.calendars.get(later.id).await.unwrap().unwrap();
    assert_eq!(untouched.subscription_id.as_deref(), Some("chan-later"));
}

#[tokio::test]
async fn test_active_calendar_without_channel_gets_one() {
    let fixture = Fixture::new();
    let calendar = fixture.active_calendar(None).await;

    let report = manager(&fixture, Arc::new(SyncRegistry::default())).renew_expiring().await.unwrap();

    assert_eq!(report.succeeded, vec![calendar.id]);
    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert!(stored.subscription_id.is_some());
}

#[tokio::test]
async fn test_renewal_failure_marks_error_and_is_retried_next_pass() {
    let fixture = Fixture::new();
    let now = Utc::now();
    let calendar = fixture.active_calendar(Some(("chan-1", now + Duration::hours(2)))).await;
    fixture.provider.fail_watch_for(&calendar.provider_calendar_id);

    let manager = manager(&fixture, Arc::new(SyncRegistry::default()));
    let report = manager.renew_expiring_at(now).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert_eq!(stored.integration_status, IntegrationStatus::Error);
    assert_eq!(stored.subscription_id.as_deref(), Some("chan-1"));

    // Still expiring, so the next pass picks it up again and recovers it.
    fixture.provider.failing_watch.lock().unwrap().clear();
    let retry = manager.renew_expiring_at(now).await.unwrap();
    assert_eq!(retry.succeeded, vec![calendar.id]);
    let recovered = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert_eq!(recovered.integration_status, IntegrationStatus::Active);
}

#[tokio::test]
async fn test_recreate_all_reports_partial_failure_per_calendar() {
    let fixture = Fixture::new();
    let now = Utc::now();
    let good = fixture.active_calendar(Some(("chan-good", now + Duration::days(5)))).await;
    let bad = fixture.active_calendar(Some(("chan-bad", now + Duration::days(5)))).await;
    fixture.provider.fail_watch_for(&bad.provider_calendar_id);

    let report = manager(&fixture, Arc::new(SyncRegistry::default())).recreate_all().await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.succeeded, vec![good.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].calendar_id, bad.id);

    let stopped = fixture.provider.stopped.lock().unwrap().clone();
    assert!(stopped.contains(&"chan-good".to_string()));
    assert!(stopped.contains(&"chan-bad".to_string()));
}

#[tokio::test]
async fn test_stop_channel_clears_subscription_and_registry() {
    let fixture = Fixture::new();
    let registry = Arc::new(SyncRegistry::default());
    let calendar = fixture.active_calendar(Some(("chan-1", Utc::now() + Duration::days(3)))).await;
    registry.remember_token(calendar.id, Some("tok".to_string()));

    let updated = manager(&fixture, registry.clone()).stop_calendar_channel(calendar.id).await.unwrap();

    assert!(updated.subscription_id.is_none());
    assert!(registry.cached_token(calendar.id).is_none());
    let stored = fixture.calendars.get(calendar.id).await.unwrap().unwrap();
    assert!(stored.subscription_id.is_none());
    assert_eq!(fixture.provider.stopped.lock().unwrap().clone(), vec!["chan-1".to_string()]);
}

#[tokio::test]
async fn test_health_degrades_above_ten_percent_errors() {
    let fixture = Fixture::new();
    let far = Utc::now() + Duration::days(5);
    let mut ids = Vec::new();
    for i in 0..10 {
        ids.push(fixture.active_calendar(Some((&format!("chan-{}", i), far))).await.id);
    }
    let manager = manager(&fixture, Arc::new(SyncRegistry::default()));

    fixture.calendars.set_status(ids[0], IntegrationStatus::Error).await.unwrap();
    let health = manager.health().await.unwrap();
    assert_eq!(health.errored, 1);
    assert!(health.healthy);

    fixture.calendars.set_status(ids[1], IntegrationStatus::Error).await.unwrap();
    let health = manager.health().await.unwrap();
    assert!(!health.healthy);
    assert!((health.error_ratio - 0.2).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_subscription_listing_reports_state() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture.active_calendar(Some(("chan-1", now + Duration::hours(5)))).await;
    fixture.active_calendar(None).await;

    let summaries = manager(&fixture, Arc::new(SyncRegistry::default())).subscriptions(now).await.unwrap();

    let states: Vec<ChannelState> = summaries.iter().map(|s| s.state).collect();
    assert!(states.contains(&ChannelState::Expiring));
    assert!(states.contains(&ChannelState::None));
}
