// libs/provisioning-cell/src/handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{BatchProvisionRequest, ProvisionRequest, ProvisionResult};
use crate::router::ProvisioningState;

const MAX_BATCH_SIZE: usize = 100;

fn result_status(result: &ProvisionResult) -> StatusCode {
    if result.success {
        if result.already_provisioned || result.reconciled {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        }
    } else if result.retryable == Some(true) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

/// Serves both `/calendars` and `/setup`.
#[axum::debug_handler]
pub async fn provision_practitioner(
    State(state): State<ProvisioningState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let result = state.workflow
        .provision(request.practitioner_id, &request.practitioner_email)
        .await;

    Ok((result_status(&result), Json(json!({
        "success": result.success,
        "result": result,
    }))))
}

#[axum::debug_handler]
pub async fn provision_batch(
    State(state): State<ProvisioningState>,
    Json(request): Json<BatchProvisionRequest>,
) -> Result<Json<Value>, AppError> {
    if request.practitioners.is_empty() {
        return Err(AppError::BadRequest("No practitioners provided".to_string()));
    }
    if request.practitioners.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "Batch size exceeds the maximum of {}",
            MAX_BATCH_SIZE
        )));
    }

    let result = state.batch.provision_all(request.practitioners).await;

    Ok(Json(json!({
        "success": result.failed == 0,
        "result": result,
    })))
}

#[axum::debug_handler]
pub async fn rollback_practitioner(
    State(state): State<ProvisioningState>,
    Path(practitioner_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let report = state.workflow.rollback_practitioner(practitioner_id).await?;

    Ok(Json(json!({
        "success": report.is_complete(),
        "report": report,
    })))
}

#[axum::debug_handler]
pub async fn onboarding_stats(State(state): State<ProvisioningState>) -> Result<Json<Value>, AppError> {
    let stats = state.workflow.onboarding_stats().await?;

    Ok(Json(json!({ "stats": stats })))
}
