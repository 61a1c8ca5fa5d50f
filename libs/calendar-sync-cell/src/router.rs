// libs/calendar-sync-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use appointment_cell::store::AppointmentStore;
use shared_config::AppConfig;
use shared_utils::extractor::admin_middleware;

use crate::handlers;
use crate::models::{ChannelPolicy, SyncWindows};
use crate::provider::CalendarProvider;
use crate::services::{
    ChannelLifecycleManager, EventService, IncrementalSyncEngine, SyncMetrics, SyncRegistry,
    WebhookHandlerService,
};
use crate::store::CalendarStore;

/// Everything the calendar routes and background jobs share.
#[derive(Clone)]
pub struct CalendarSyncState {
    pub config: Arc<AppConfig>,
    pub calendars: Arc<dyn CalendarStore>,
    pub registry: Arc<SyncRegistry>,
    pub metrics: Arc<SyncMetrics>,
    pub webhook: Arc<WebhookHandlerService>,
    pub lifecycle: Arc<ChannelLifecycleManager>,
    pub events: Arc<EventService>,
}

impl CalendarSyncState {
    pub fn new(
        config: Arc<AppConfig>,
        calendars: Arc<dyn CalendarStore>,
        appointments: Arc<dyn AppointmentStore>,
        provider: Arc<dyn CalendarProvider>,
    ) -> Self {
        let registry = Arc::new(SyncRegistry::default());
        let metrics = Arc::new(SyncMetrics::new());

        let engine = Arc::new(IncrementalSyncEngine::new(
            calendars.clone(),
            appointments.clone(),
            provider.clone(),
            registry.clone(),
            SyncWindows::default(),
        ));
        let webhook = WebhookHandlerService::new(calendars.clone(), registry.clone(), engine, metrics.clone())
            .with_channel_token(config.calendar_webhook_token.clone());
        let lifecycle = ChannelLifecycleManager::new(
            calendars.clone(),
            provider.clone(),
            registry.clone(),
            metrics.clone(),
            ChannelPolicy::default(),
        );
        let events = EventService::new(calendars.clone(), appointments, provider);

        Self {
            config,
            calendars,
            registry,
            metrics,
            webhook: Arc::new(webhook),
            lifecycle: Arc::new(lifecycle),
            events: Arc::new(events),
        }
    }
}

pub fn calendar_routes(state: CalendarSyncState) -> Router {
    // Provider push notifications and health probes carry no user session.
    let public_routes = Router::new()
        .route("/webhook", post(handlers::receive_webhook))
        .route("/health", get(handlers::channel_health));

    let admin_routes = Router::new()
        .route("/calendars", get(handlers::list_calendars))
        .route("/calendars/practitioner/{practitioner_id}", get(handlers::get_practitioner_calendar))
        .route("/calendars/{calendar_id}/events", post(handlers::create_event))
        .route("/calendars/{calendar_id}/events/{event_id}", put(handlers::update_event))
        .route("/calendars/{calendar_id}/events/{event_id}", delete(handlers::delete_event))
        .route("/calendars/{calendar_id}/subscription", delete(handlers::stop_subscription))
        .route("/subscriptions", get(handlers::list_subscriptions))
        .route("/subscriptions/renew", post(handlers::renew_subscriptions))
        .route("/subscriptions/recreate", post(handlers::recreate_subscriptions))
        .route("/metrics", get(handlers::get_metrics))
        .layer(middleware::from_fn_with_state(state.config.clone(), admin_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
