//! Guest pass endpoints

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::credentials;
use crate::types::{GuestPass, GuestPassSpec};

/// A pass plus its validity right now.
#[derive(Debug, Serialize)]
pub struct PassView {
    #[serde(flatten)]
    pub pass: GuestPass,
    pub valid_now: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokedPass {
    pub token: String,
    pub revoked: bool,
}

/// POST /api/v2/passes: issue a pass. Tokens are always server-generated.
pub async fn issue_pass(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    if body.get("token").is_some() {
        return ApiErrorResponse::validation("token is generated by the server and cannot be supplied");
    }
    let spec: GuestPassSpec = match serde_json::from_value(body) {
        Ok(spec) => spec,
        Err(e) => return ApiErrorResponse::validation(format!("invalid pass request: {e}")),
    };

    match state.services.credentials.issue(spec).await {
        Ok(pass) => ApiResponse::created(pass),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/passes/:token
pub async fn get_pass(State(state): State<ApiState>, Path(token): Path<String>) -> Response {
    match state.services.credentials.resolve(&token).await {
        Ok(Some(pass)) => {
            let valid_now = credentials::is_valid(&pass, Utc::now());
            ApiResponse::ok(PassView { pass, valid_now })
        }
        Ok(None) => ApiErrorResponse::not_found(format!("guest pass not found: {token}")),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// DELETE /api/v2/passes/:token. A repeated revoke answers 404.
pub async fn revoke_pass(State(state): State<ApiState>, Path(token): Path<String>) -> Response {
    match state.services.credentials.revoke(&token).await {
        Ok(()) => ApiResponse::ok(RevokedPass { token, revoked: true }),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/condominios/:id/passes
pub async fn list_passes(State(state): State<ApiState>, Path(condominio_id): Path<String>) -> Response {
    match state.services.credentials.list_by_condominio(&condominio_id).await {
        Ok(passes) => {
            let now = Utc::now();
            let views: Vec<PassView> = passes
                .into_iter()
                .map(|pass| PassView { valid_now: credentials::is_valid(&pass, now), pass })
                .collect();
            ApiResponse::ok(views)
        }
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}
