//! HTTP adapter for the report lifecycle engine.
//!
//! Routes follow the legacy probe protocol: report endpoints are mounted
//! both bare and under `/api/v1`. All requests and responses are JSON.

pub mod config;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use report_engine::{CloseReason, EngineError, ReportEngine};
use report_models::{CreateReportRequest, MeasurementEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use config::CollectorConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReportEngine>,
}

pub fn router(engine: Arc<ReportEngine>) -> Router {
    let reports = Router::new()
        .route("/report", post(create_report))
        .route("/report", put(deprecated_update_report))
        .route("/report/:report_id", post(update_report))
        .route("/report/:report_id/close", post(close_report))
        .route("/measurement", post(submit_measurement));

    Router::new()
        .route("/health", get(health))
        .route("/admin/report-file/:filename", delete(delete_report_file))
        .merge(reports.clone())
        .nest("/api/v1", reports)
        .with_state(AppState { engine })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "error": message.into() }))
}

async fn create_report(
    State(state): State<AppState>,
    Json(req): Json<CreateReportRequest>,
) -> Response {
    match state.engine.open(&req).await {
        Ok(report_id) => (
            StatusCode::OK,
            Json(json!({
                "backend_version": state.engine.backend_version(),
                "report_id": report_id,
                "supported_formats": ["json"],
            })),
        )
            .into_response(),
        // The legacy create endpoint reports every failure, storage
        // included, as a bad request.
        Err(err) => (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response(),
    }
}

async fn deprecated_update_report() -> Json<serde_json::Value> {
    Json(json!({ "status": "success" }))
}

#[derive(Deserialize)]
struct UpdateReportRequest {
    content: MeasurementEntry,
    #[serde(default)]
    format: String,
}

async fn update_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Json(req): Json<UpdateReportRequest>,
) -> Response {
    if !req.format.is_empty() && req.format != "json" {
        return (StatusCode::BAD_REQUEST, error_body("invalid \"format\" field")).into_response();
    }
    let mut entry = req.content;
    match state.engine.append(&report_id, &mut entry).await {
        Ok(measurement_id) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "measurement_id": measurement_id,
            })),
        )
            .into_response(),
        Err(EngineError::NotFound) => {
            (StatusCode::NOT_FOUND, error_body("report not found")).into_response()
        }
        Err(err) if err.is_client_error() => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response()
        }
        Err(err) => storage_failure("append", &report_id, err),
    }
}

async fn close_report(State(state): State<AppState>, Path(report_id): Path<String>) -> Response {
    match state.engine.close(&report_id, CloseReason::Explicit).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))).into_response(),
        // Legacy close shape: unknown report ids answer 406.
        Err(EngineError::NotFound) => {
            (StatusCode::NOT_ACCEPTABLE, error_body("report not found")).into_response()
        }
        Err(err) if err.is_client_error() => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response()
        }
        Err(err) => storage_failure("close", &report_id, err),
    }
}

#[derive(Deserialize)]
struct SubmitQuery {
    #[serde(default)]
    close: bool,
}

async fn submit_measurement(
    State(state): State<AppState>,
    Query(query): Query<SubmitQuery>,
    Json(mut entry): Json<MeasurementEntry>,
) -> Response {
    match state.engine.submit_one(&mut entry, query.close).await {
        Ok((report_id, measurement_id)) => (
            StatusCode::OK,
            Json(json!({
                "report_id": report_id,
                "measurement_id": measurement_id,
            })),
        )
            .into_response(),
        Err(EngineError::NotFound) => {
            (StatusCode::NOT_FOUND, error_body("report not found")).into_response()
        }
        Err(err) if err.is_client_error() => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response()
        }
        Err(err) => storage_failure("submit", &entry.report_id, err),
    }
}

async fn delete_report_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.engine.delete_archived(&filename) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "deleted" }))).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response(),
    }
}

fn storage_failure(operation: &str, report_id: &str, err: EngineError) -> Response {
    tracing::error!(
        operation = operation,
        report_id = %report_id,
        error = %err,
        "storage failure"
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("internal storage error"),
    )
        .into_response()
}
