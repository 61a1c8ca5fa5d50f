// libs/calendar-sync-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::error::CalendarSyncError;
use crate::models::{EventDraft, WebhookNotification};
use crate::router::CalendarSyncState;

#[derive(Debug, Deserialize)]
pub struct DeleteEventQuery {
    pub appointment_id: Option<Uuid>,
}

// ==============================================================================
// PUBLIC ENDPOINTS
// ==============================================================================

#[axum::debug_handler]
pub async fn receive_webhook(
    State(state): State<CalendarSyncState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let notification = WebhookNotification::from_headers(&headers).map_err(|e| match e {
        CalendarSyncError::MissingField(field) => {
            AppError::BadRequest(format!("Missing required header: {}", field))
        }
        other => AppError::BadRequest(other.to_string()),
    })?;

    let result = state.webhook.process(&notification).await.map_err(|e| {
        error!("Webhook processing failed for channel {}: {}", notification.channel_id, e);
        AppError::Internal("Failed to process notification".to_string())
    })?;

    Ok(Json(json!({
        "success": result.is_success(),
        "result": result,
    })))
}

#[axum::debug_handler]
pub async fn channel_health(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    let health = state.lifecycle.health().await?;

    Ok(Json(json!({
        "status": if health.healthy { "healthy" } else { "degraded" },
        "channels": health,
        "syncs_in_flight": state.registry.in_flight(),
        "timestamp": Utc::now(),
    })))
}

// ==============================================================================
// CALENDAR QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_calendars(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    let calendars = state.calendars.list().await?;

    Ok(Json(json!({
        "total": calendars.len(),
        "calendars": calendars,
    })))
}

#[axum::debug_handler]
pub async fn get_practitioner_calendar(
    State(state): State<CalendarSyncState>,
    Path(practitioner_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let calendar = state.calendars
        .find_by_practitioner(practitioner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No calendar for practitioner {}", practitioner_id)))?;

    Ok(Json(json!({ "calendar": calendar })))
}

// ==============================================================================
// PROVIDER EVENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_event(
    State(state): State<CalendarSyncState>,
    Path(calendar_id): Path<Uuid>,
    Json(draft): Json<EventDraft>,
) -> Result<Json<Value>, AppError> {
    let event = state.events.create_event(calendar_id, &draft).await?;

    Ok(Json(json!({
        "success": true,
        "event": event,
    })))
}

#[axum::debug_handler]
pub async fn update_event(
    State(state): State<CalendarSyncState>,
    Path((calendar_id, event_id)): Path<(Uuid, String)>,
    Json(draft): Json<EventDraft>,
) -> Result<Json<Value>, AppError> {
    let event = state.events.update_event(calendar_id, &event_id, &draft).await?;

    Ok(Json(json!({
        "success": true,
        "event": event,
    })))
}

#[axum::debug_handler]
pub async fn delete_event(
    State(state): State<CalendarSyncState>,
    Path((calendar_id, event_id)): Path<(Uuid, String)>,
    Query(query): Query<DeleteEventQuery>,
) -> Result<Json<Value>, AppError> {
    state.events.delete_event(calendar_id, &event_id, query.appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "event_id": event_id,
    })))
}

// ==============================================================================
// SUBSCRIPTIONS & METRICS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_subscriptions(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    let subscriptions = state.lifecycle.subscriptions(Utc::now()).await?;

    Ok(Json(json!({
        "total": subscriptions.len(),
        "subscriptions": subscriptions,
    })))
}

#[axum::debug_handler]
pub async fn renew_subscriptions(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    let report = state.lifecycle.renew_expiring().await?;

    Ok(Json(json!({
        "success": report.failed.is_empty(),
        "report": report,
    })))
}

#[axum::debug_handler]
pub async fn recreate_subscriptions(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    let report = state.lifecycle.recreate_all().await?;

    Ok(Json(json!({
        "success": report.failed.is_empty(),
        "report": report,
    })))
}

#[axum::debug_handler]
pub async fn stop_subscription(
    State(state): State<CalendarSyncState>,
    Path(calendar_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let calendar = state.lifecycle.stop_calendar_channel(calendar_id).await?;

    Ok(Json(json!({
        "success": true,
        "calendar": calendar,
    })))
}

#[axum::debug_handler]
pub async fn get_metrics(State(state): State<CalendarSyncState>) -> Result<Json<Value>, AppError> {
    Ok(Json(json!({
        "metrics": state.metrics.snapshot(),
        "cached_tokens": state.registry.cached_tokens(),
        "syncs_in_flight": state.registry.in_flight(),
    })))
}
