//! API route definitions.

use super::state::AppState;
use crate::detect::DetectionConfig;
use crate::error::EngineError;
use crate::rca::analyzer::parse_anomaly_id;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plants/{plant_id}/anomalies", get(list_anomalies))
        .route("/plants/{plant_id}/anomalies/detect", post(detect))
        .route("/anomalies/{id}", get(get_anomaly))
        .route(
            "/anomalies/{id}/root-cause",
            get(get_root_cause).post(analyze_root_cause),
        )
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetectRequest {
    period_hours: Option<u32>,
    config: Option<DetectionConfig>,
}

/// An empty body means "use the configured defaults".
async fn detect(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, EngineError> {
    let request: DetectRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DetectRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| EngineError::invalid(format!("malformed request body: {e}")))?
    };

    let report = state
        .engine
        .detect(&plant_id, request.period_hours, request.config)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_anomalies(
    State(state): State<AppState>,
    Path(plant_id): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, EngineError> {
    let Query(params) = params.map_err(|e| EngineError::invalid(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(EngineError::invalid(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }

    let store = state.anomalies.clone();
    let (anomalies, total) = tokio::task::spawn_blocking(move || {
        let anomalies = store.list_for_plant(&plant_id, limit)?;
        let total = store.count_for_plant(&plant_id)?;
        Ok::<_, EngineError>((anomalies, total))
    })
    .await??;

    Ok(Json(json!({
        "data": anomalies,
        "meta": { "total": total }
    })))
}

async fn get_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let id = parse_anomaly_id(&id)?;
    let store = state.anomalies.clone();
    let anomaly = tokio::task::spawn_blocking(move || store.get(id))
        .await??
        .ok_or_else(|| EngineError::not_found("anomaly", id))?;
    Ok(Json(serde_json::to_value(anomaly)?))
}

/// 201 when this request produced the analysis, 200 when it already existed.
async fn analyze_root_cause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), EngineError> {
    let outcome = state.analyzer.analyze(&id).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(serde_json::to_value(outcome)?)))
}

async fn get_root_cause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let rca = state
        .analyzer
        .existing(&id)
        .await?
        .ok_or_else(|| EngineError::not_found("root cause analysis for anomaly", id.trim()))?;
    Ok(Json(json!({ "rca": rca })))
}
