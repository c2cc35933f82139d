//! Bitácora endpoints

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::EscalationOutcome;

#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    pub author_id: String,
    pub condominio_id: String,
    pub report: String,
}

/// Per-entry line of a batch escalation.
#[derive(Debug, Serialize)]
pub struct PendingLine {
    pub entry_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EscalationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// POST /api/v2/bitacora
pub async fn record_entry(State(state): State<ApiState>, Json(req): Json<RecordRequest>) -> Response {
    match state
        .services
        .escalation
        .record(&req.author_id, &req.condominio_id, &req.report)
        .await
    {
        Ok(entry) => ApiResponse::created(entry),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/bitacora/:id
pub async fn get_entry(State(state): State<ApiState>, Path(entry_id): Path<String>) -> Response {
    match state.services.escalation.get_entry(&entry_id).await {
        Ok(entry) => ApiResponse::ok(entry),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// POST /api/v2/bitacora/:id/escalate
pub async fn escalate_entry(State(state): State<ApiState>, Path(entry_id): Path<String>) -> Response {
    match state.services.escalation.process_entry(&entry_id).await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => ApiErrorResponse::from_escalation(&e),
    }
}

/// POST /api/v2/condominios/:id/bitacora/escalate-pending
pub async fn escalate_pending(
    State(state): State<ApiState>,
    Path(condominio_id): Path<String>,
) -> Response {
    match state.services.escalation.process_pending(&condominio_id).await {
        Ok(results) => {
            let lines: Vec<PendingLine> = results
                .into_iter()
                .map(|r| match r.result {
                    Ok(outcome) => PendingLine {
                        entry_id: r.entry_id,
                        outcome: Some(outcome),
                        error: None,
                        retryable: None,
                    },
                    Err(e) => PendingLine {
                        entry_id: r.entry_id,
                        outcome: None,
                        retryable: Some(e.core().is_retryable()),
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            ApiResponse::ok(lines)
        }
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}
