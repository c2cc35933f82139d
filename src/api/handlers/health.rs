//! Liveness endpoint

use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use super::ApiState;
use crate::api::envelope::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub storage: &'static str,
    pub oracle: &'static str,
    pub alert_poll_interval_secs: u64,
}

/// GET /api/v2/health
pub async fn health(State(state): State<ApiState>) -> Response {
    let services = &state.services;
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        storage: services.store_backend,
        oracle: services.classifier.oracle_name(),
        alert_poll_interval_secs: services.poll_interval_secs,
    })
}
