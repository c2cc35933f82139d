//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v2/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port, in-memory store, scripted oracle.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use caseta::api::{create_app, ApiState};
use caseta::classifier::{ClassificationTask, PayrollReview, ScriptedOracle, VehicleAttributeScan};
use caseta::config::CasetaConfig;
use caseta::services::Services;
use caseta::storage::InMemoryStore;

fn app_with(oracle: ScriptedOracle) -> Router {
    let services = Services::build(
        Arc::new(InMemoryStore::new()),
        Arc::new(oracle),
        &CasetaConfig::default(),
    );
    create_app(ApiState::new(Arc::new(services)))
}

fn app() -> Router {
    app_with(ScriptedOracle::new())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn vehicular_pass(expires_at: chrono::DateTime<Utc>) -> Value {
    json!({
        "guest_name": "Ana",
        "access_type": "vehicular",
        "license_plate": "abc123",
        "mode": "bounded",
        "expires_at": expires_at,
        "condominio_id": "c1",
        "residence_id": "r-12"
    })
}

#[tokio::test]
async fn test_health_returns_envelope() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/v2/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["storage"], "memory");
    assert_eq!(body["data"]["oracle"], "scripted");
    assert_eq!(body["meta"]["version"], "2");
}

#[tokio::test]
async fn test_pass_lifecycle() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/passes",
        Some(vehicular_pass(Utc::now() + Duration::hours(1))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["license_plate"], "ABC123");
    assert_eq!(body["data"]["mode"], "bounded");

    let (status, body) = send(&app, "GET", &format!("/api/v2/passes/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid_now"], true);

    let (status, body) = send(&app, "GET", "/api/v2/condominios/c1/passes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v2/passes/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "DELETE", &format!("/api/v2/passes/{token}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, "GET", &format!("/api/v2/passes/{token}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_issue_rejects_bad_requests() {
    let app = app();

    let past = send(
        &app,
        "POST",
        "/api/v2/passes",
        Some(vehicular_pass(Utc::now() - Duration::minutes(1))),
    )
    .await;
    assert_eq!(past.0, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(past.1["error"]["code"], "VALIDATION_ERROR");

    let mut with_token = vehicular_pass(Utc::now() + Duration::hours(1));
    with_token["token"] = json!("my-own-token");
    let (status, _) = send(&app, "POST", "/api/v2/passes", Some(with_token)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut no_plate = vehicular_pass(Utc::now() + Duration::hours(1));
    no_plate["license_plate"] = Value::Null;
    let (status, _) = send(&app, "POST", "/api/v2/passes", Some(no_plate)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_gate_admit_and_audit_log() {
    let app = app();
    let (_, body) = send(
        &app,
        "POST",
        "/api/v2/passes",
        Some(vehicular_pass(Utc::now() + Duration::hours(1))),
    )
    .await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/gate/admit",
        Some(json!({"access_type": "vehicular", "token": token, "condominio_id": "c1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["decision"]["decision"], "admit");
    assert_eq!(body["data"]["registration"]["outcome"], "admitted");

    let (_, body) = send(
        &app,
        "POST",
        "/api/v2/gate/admit",
        Some(json!({"access_type": "pedestrian", "token": token, "condominio_id": "c1"})),
    )
    .await;
    assert_eq!(body["data"]["decision"]["decision"], "deny");
    assert_eq!(body["data"]["decision"]["reason"], "type_mismatch");

    let (_, body) = send(
        &app,
        "POST",
        "/api/v2/gate/admit",
        Some(json!({"access_type": "pedestrian", "condominio_id": "c1", "visitor_name": "Luis"})),
    )
    .await;
    assert_eq!(body["data"]["decision"]["decision"], "admit_unverified");

    let (status, body) = send(&app, "GET", "/api/v2/condominios/c1/registrations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_vehicle_scan_admits_with_extracted_attributes() {
    let app = app_with(ScriptedOracle::new().with_response(
        VehicleAttributeScan::NAME,
        json!({"vehicle_type": "suv", "brand": "Mazda", "color": "Gray", "plate": "xyz 987"}),
    ));

    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/gate/vehicle-scan",
        Some(json!({"image": "data:image/jpeg;base64,/9j/4AAQ", "condominio_id": "c1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["scan"]["vehicle_type"], "suv");
    assert_eq!(body["data"]["admission"]["registration"]["vehicle"]["plate"], "XYZ 987");
    assert_eq!(body["data"]["admission"]["decision"]["decision"], "admit_unverified");
}

#[tokio::test]
async fn test_vehicle_scan_failure_records_nothing() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/gate/vehicle-scan",
        Some(json!({"image": "/9j/4AAQ", "mime_type": "image/jpeg", "condominio_id": "c1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "CLASSIFICATION_ERROR");

    let (_, body) = send(&app, "GET", "/api/v2/condominios/c1/registrations", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_alert_raise_list_clear() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/alerts",
        Some(json!({"guard_id": "guard-1", "condominio_id": "c1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let alert_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, "GET", "/api/v2/condominios/c1/alerts/active", None).await;
    assert_eq!(body["data"]["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["poll_interval_secs"], 30);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v2/alerts/{alert_id}/clear"),
        Some(json!({"cleared_by": "admin-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], true);
    assert_eq!(body["data"]["cleared_by"], "admin-7");

    let (status, body) = send(&app, "POST", &format!("/api/v2/alerts/{alert_id}/clear"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_CLEARED");
    assert_eq!(body["error"]["retryable"], false);

    let (status, _) = send(&app, "POST", "/api/v2/alerts/nope/clear", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/api/v2/condominios/c1/alerts/active", None).await;
    assert!(body["data"]["alerts"].as_array().unwrap().is_empty());
    let (_, body) = send(&app, "GET", "/api/v2/condominios/c1/alerts/history", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_alert_stream_is_event_stream() {
    let app = app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v2/condominios/c1/alerts/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
}

#[tokio::test]
async fn test_bitacora_escalation() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/bitacora",
        Some(json!({
            "author_id": "guard-1",
            "condominio_id": "c1",
            "report": "water leak detected in parking garage"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let entry_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) =
        send(&app, "POST", &format!("/api/v2/bitacora/{entry_id}/escalate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "escalated");
    let petition_id = body["data"]["petition_id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, "GET", &format!("/api/v2/bitacora/{entry_id}"), None).await;
    assert_eq!(body["data"]["petition_id"], petition_id.as_str());

    let (_, body) = send(&app, "POST", &format!("/api/v2/bitacora/{entry_id}/escalate"), None).await;
    assert_eq!(body["data"]["outcome"], "already_escalated");
}

#[tokio::test]
async fn test_escalate_pending_reports_each_entry() {
    let app = app();
    for report in ["routine patrol completed, nothing to report", "broken gate motor"] {
        send(
            &app,
            "POST",
            "/api/v2/bitacora",
            Some(json!({"author_id": "g", "condominio_id": "c9", "report": report})),
        )
        .await;
    }

    let (status, body) =
        send(&app, "POST", "/api/v2/condominios/c9/bitacora/escalate-pending", None).await;
    assert_eq!(status, StatusCode::OK);
    let lines = body["data"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    let outcomes: Vec<&str> = lines.iter().map(|l| l["outcome"]["outcome"].as_str().unwrap()).collect();
    assert!(outcomes.contains(&"no_action"));
    assert!(outcomes.contains(&"escalated"));
}

#[tokio::test]
async fn test_classify_payroll() {
    let app = app_with(ScriptedOracle::new().with_response(
        PayrollReview::NAME,
        json!({"status": "anomalies_found", "anomalies": [
            {"employee": "Luis", "field": "total_paid", "description": "paid 5000 for 2880 due"}
        ]}),
    ));
    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/classify/payroll",
        Some(json!({"rows": [{
            "employee": "Luis", "role": "guard", "hours_worked": 48.0,
            "hourly_rate": 60.0, "deductions": 0.0, "total_paid": 5000.0
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "anomalies_found");
    assert_eq!(body["data"]["anomalies"][0]["field"], "total_paid");
}

#[tokio::test]
async fn test_classify_document_not_found_sentinel() {
    let app = app_with(
        ScriptedOracle::new().with_response("document_field", json!({"value": ""})),
    );
    let (status, body) = send(
        &app,
        "POST",
        "/api/v2/classify/document",
        Some(json!({"field": "full name", "image": "AQID", "mime_type": "image/png"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["found"], false);
    assert_eq!(body["data"]["value"], "");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/v2/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
