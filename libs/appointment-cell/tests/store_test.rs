use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, SessionType};
use appointment_cell::store::{AppointmentStore, SupabaseAppointmentStore};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn store_for(server: &MockServer) -> SupabaseAppointmentStore {
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    SupabaseAppointmentStore::new(Arc::new(SupabaseClient::with_service_role(&config)))
}

#[tokio::test]
async fn test_active_range_query_filters_on_server() {
    let server = MockServer::start().await;
    let practitioner = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("practitioner_id", format!("eq.{}", practitioner)))
        .and(query_param("start_time", "lt.2025-03-10T10:00:00Z"))
        .and(query_param("end_time", "gt.2025-03-10T09:00:00Z"))
        .and(query_param("status", "in.(scheduled,confirmed)"))
        .and(query_param("archived", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), practitioner, start, end, "confirmed")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = store_for(&server).find_active_in_range(practitioner, start, end).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AppointmentStatus::Confirmed);
    assert_eq!(rows[0].session_type, SessionType::Individual);
}

#[tokio::test]
async fn test_duplicate_idempotency_key_surfaces_as_duplicate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint", "23505"),
        ))
        .mount(&server)
        .await;

    let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let mut appointment = Appointment::new(Uuid::new_v4(), None, start, start + chrono::Duration::hours(1), SessionType::Couples);
    appointment.idempotency_key = Some("dup".to_string());

    let result = store_for(&server).insert(appointment).await;

    assert_matches!(result, Err(AppointmentError::DuplicateKey(_)));
}

#[tokio::test]
async fn test_outage_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store_for(&server).find_by_idempotency_key("key").await.unwrap_err();

    assert_matches!(err, AppointmentError::Unavailable(_));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_status_update_patches_single_row() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(body_partial_json(json!({ "status": "rescheduled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(id, Uuid::new_v4(), start, start, "rescheduled")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).update_status(id, AppointmentStatus::Rescheduled).await.unwrap();
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = store_for(&server).set_provider_event(Uuid::new_v4(), Some("evt-1")).await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}
