mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use provisioning_cell::{provisioning_routes, ProvisioningState};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

use common::Fixture;

fn app(fixture: &Fixture) -> (Router, TestConfig) {
    let test_config = TestConfig::default();
    let state = ProvisioningState::new(test_config.to_arc(), Arc::new(fixture.workflow()));
    (provisioning_routes(state), test_config)
}

fn request(method: &str, uri: &str, token: Option<String>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", token);
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_provisioning_requires_admin() {
    let fixture = Fixture::new();
    let (app, config) = app(&fixture);
    let practitioner = TestUser::practitioner("rivera@practice.test");

    let anonymous = app.clone().oneshot(request("GET", "/stats", None, None)).await.unwrap();
    let forbidden = app
        .oneshot(request("GET", "/stats", Some(JwtTestUtils::bearer(&practitioner, &config.jwt_secret)), None))
        .await
        .unwrap();

    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_setup_creates_then_reports_existing_calendar() {
    let fixture = Fixture::new();
    let practitioner = fixture.practitioner("rivera@practice.test").await;
    let (app, config) = app(&fixture);
    let token = JwtTestUtils::bearer(&TestUser::admin("ops@practice.test"), &config.jwt_secret);
    let body = json!({
        "practitioner_id": practitioner.id,
        "practitioner_email": "rivera@practice.test",
    });

    let created = app
        .clone()
        .oneshot(request("POST", "/setup", Some(token.clone()), Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["result"]["step"], "completed");

    let repeated = app
        .oneshot(request("POST", "/calendars", Some(token), Some(body)))
        .await
        .unwrap();
    assert_eq!(repeated.status(), StatusCode::OK);
    let repeated = json_body(repeated).await;
    assert_eq!(repeated["result"]["already_provisioned"], true);
    assert_eq!(repeated["result"]["calendar_id"], created["result"]["calendar_id"]);
}

#[tokio::test]
async fn test_setup_rejects_invalid_email_as_unprocessable() {
    let fixture = Fixture::new();
    let practitioner = fixture.practitioner("rivera@practice.test").await;
    let (app, config) = app(&fixture);
    let token = JwtTestUtils::bearer(&TestUser::admin("ops@practice.test"), &config.jwt_secret);

    let response = app
        .oneshot(request(
            "POST",
            "/setup",
            Some(token),
            Some(json!({ "practitioner_id": practitioner.id, "practitioner_email": "nope" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["result"]["step"], "validation");
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let fixture = Fixture::new();
    let (app, config) = app(&fixture);
    let token = JwtTestUtils::bearer(&TestUser::admin("ops@practice.test"), &config.jwt_secret);

    let response = app
        .oneshot(request("POST", "/setup/batch", Some(token), Some(json!({ "practitioners": [] }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rollback_and_stats_endpoints() {
    let fixture = Fixture::new();
    let practitioner = fixture.practitioner("rivera@practice.test").await;
    fixture.workflow().provision(practitioner.id, "rivera@practice.test").await;
    let (app, config) = app(&fixture);
    let token = JwtTestUtils::bearer(&TestUser::admin("ops@practice.test"), &config.jwt_secret);

    let stats = app
        .clone()
        .oneshot(request("GET", "/stats", Some(token.clone()), None))
        .await
        .unwrap();
    assert_eq!(stats.status(), StatusCode::OK);
    assert_eq!(json_body(stats).await["stats"]["active"], 1);

    let rollback = app
        .oneshot(request("POST", &format!("/rollback/{}", practitioner.id), Some(token), None))
        .await
        .unwrap();
    assert_eq!(rollback.status(), StatusCode::OK);
    let body = json_body(rollback).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["report"]["calendar_row_deleted"], true);
    assert_eq!(fixture.profile_calendar(practitioner.id).await, None);
}
