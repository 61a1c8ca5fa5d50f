// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{AdmissionDecision, BatchAvailabilityRequest, BookingAttempt, RejectionReason};
use crate::router::AppointmentState;

const MAX_BATCH_ATTEMPTS: usize = 50;

fn decision_status(decision: &AdmissionDecision) -> StatusCode {
    if decision.admitted {
        return if decision.replayed || decision.appointment.is_none() {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
    }

    match decision.reason {
        Some(RejectionReason::SlotConflict) => StatusCode::CONFLICT,
        Some(RejectionReason::AvailabilityUnknown) | Some(RejectionReason::StorageUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Books a slot. Practitioners may book their own calendar, clients may book for
/// themselves, administrators for anyone.
#[axum::debug_handler]
pub async fn admit_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(attempt): Json<BookingAttempt>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let is_practitioner = attempt.practitioner_id.to_string() == user.id;
    let is_client = attempt.client_id.is_some_and(|id| id.to_string() == user.id);

    if !is_practitioner && !is_client && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to book for this practitioner".to_string()));
    }

    let decision = state.admission.admit(attempt).await;
    let status = decision_status(&decision);

    Ok((status, Json(json!({
        "success": decision.admitted,
        "decision": decision,
    }))))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(attempt): Json<BookingAttempt>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let decision = state.admission.check_availability(&attempt).await;

    Ok(Json(json!({
        "available": decision.admitted,
        "decision": decision,
    })))
}

#[axum::debug_handler]
pub async fn batch_check_availability(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<BatchAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    if request.attempts.is_empty() {
        return Err(AppError::BadRequest("At least one slot is required".to_string()));
    }
    if request.attempts.len() > MAX_BATCH_ATTEMPTS {
        return Err(AppError::BadRequest(format!(
            "At most {} slots can be checked at once",
            MAX_BATCH_ATTEMPTS
        )));
    }

    let decisions = state.admission.batch_check_availability(&request.attempts).await;
    let results: Vec<Value> = request.attempts.iter()
        .zip(decisions)
        .map(|(attempt, decision)| json!({
            "practitioner_id": attempt.practitioner_id,
            "start_time": attempt.start_time,
            "end_time": attempt.end_time,
            "available": decision.admitted,
            "decision": decision,
        }))
        .collect();

    let available = results.iter().filter(|r| r["available"] == json!(true)).count();

    Ok(Json(json!({
        "total": results.len(),
        "available": available,
        "results": results,
    })))
}
