use super::*;
use crate::config::DetectionSettings;
use crate::storage::test_support::temp_pool;
use crate::telemetry::{Reading, SqliteTelemetry};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

/// Twelve hours of steady output with a single spike, ending one hour ago.
fn seeded_app() -> (tempfile::TempDir, Router) {
    let (dir, pool) = temp_pool();
    let start = Utc::now() - Duration::hours(13);
    let readings: Vec<Reading> = (0..48)
        .map(|i| {
            let power = if i == 24 { 500.0 } else if i % 2 == 0 { 100.0 } else { 110.0 };
            Reading {
                plant_id: "plant-1".into(),
                timestamp: start + Duration::minutes(15 * i),
                power,
                energy: power / 4.0,
            }
        })
        .collect();
    SqliteTelemetry::new(pool.clone())
        .insert_readings(&readings)
        .unwrap();
    let state = AppState::from_pool(pool, &DetectionSettings::default());
    (dir, router(state))
}

async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_handler() {
    let (_dir, app) = seeded_app();
    let (status, json) = call(&app, "GET", "/api/v1/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_detect_then_list() {
    let (_dir, app) = seeded_app();

    let (status, report) = call(&app, "POST", "/api/v1/plants/plant-1/anomalies/detect", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["anomalies_detected"], 1);
    assert_eq!(report["anomalies_persisted"], 1);
    assert_eq!(report["anomalies"][0]["anomaly_type"], "unexpected_spike");
    assert_eq!(report["failed_detectors"], serde_json::json!([]));

    let (status, listed) = call(&app, "GET", "/api/v1/plants/plant-1/anomalies?limit=10", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["meta"]["total"], 1);
    assert_eq!(listed["data"][0]["id"], report["anomalies"][0]["id"]);
}

#[tokio::test]
async fn test_detect_with_config_override() {
    let (_dir, app) = seeded_app();
    let body = r#"{"period_hours": 48, "config": {"statistical_enabled": false}}"#;
    let (status, report) = call(&app, "POST", "/api/v1/plants/plant-1/anomalies/detect", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["anomalies_detected"], 0);
}

#[tokio::test]
async fn test_detect_rejects_bad_input() {
    let (_dir, app) = seeded_app();
    let uri = "/api/v1/plants/plant-1/anomalies/detect";

    let (status, err) = call(&app, "POST", uri, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_INPUT");

    let (status, err) = call(&app, "POST", uri, r#"{"period_hours": 0}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_INPUT");

    let (status, err) = call(&app, "POST", uri, r#"{"config": {"sensitivty": "high"}}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].as_str().unwrap().contains("sensitivty"));

    let (status, _) = call(&app, "POST", "/api/v1/plants/%20/anomalies/detect", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_rejects_bad_limit() {
    let (_dir, app) = seeded_app();
    for uri in [
        "/api/v1/plants/plant-1/anomalies?limit=0",
        "/api/v1/plants/plant-1/anomalies?limit=abc",
    ] {
        let (status, err) = call(&app, "GET", uri, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(err["code"], "INVALID_INPUT");
    }
}

#[tokio::test]
async fn test_anomaly_lookup_errors() {
    let (_dir, app) = seeded_app();

    let (status, err) = call(&app, "GET", "/api/v1/anomalies/not-a-uuid", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_INPUT");

    let missing = format!("/api/v1/anomalies/{}", uuid::Uuid::new_v4());
    let (status, err) = call(&app, "GET", &missing, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");

    let (status, _) = call(&app, "POST", &format!("{missing}/root-cause"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_root_cause_lifecycle() {
    let (_dir, app) = seeded_app();
    let (_, report) = call(&app, "POST", "/api/v1/plants/plant-1/anomalies/detect", "").await;
    let id = report["anomalies"][0]["id"].as_str().unwrap().to_string();
    let rca_uri = format!("/api/v1/anomalies/{id}/root-cause");

    let (status, _) = call(&app, "GET", &rca_uri, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, first) = call(&app, "POST", &rca_uri, "").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["rca"]["anomaly_id"], id.as_str());
    assert_eq!(first["rca"]["dependency_graph"]["nodes"].as_array().unwrap().len(), 4);
    assert!(first.get("warnings").is_none());

    let (status, second) = call(&app, "POST", &rca_uri, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["rca"]["id"], first["rca"]["id"]);

    let (status, fetched) = call(&app, "GET", &rca_uri, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["rca"]["id"], first["rca"]["id"]);

    let (_, anomaly) = call(&app, "GET", &format!("/api/v1/anomalies/{id}"), "").await;
    assert_eq!(anomaly["root_cause_id"], first["rca"]["id"]);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (_dir, app) = seeded_app();
    let (status, err) = call(&app, "GET", "/api/v2/nothing", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");
}
