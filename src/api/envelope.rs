//! Consistent response envelope for all v2 API endpoints.
//!
//! Every v2 response is wrapped in either [`ApiResponse`] (success) or
//! [`ApiErrorResponse`] (error), ensuring a uniform JSON shape. Core errors
//! map to a status code and a stable error code in one place,
//! [`ApiErrorResponse::from_core`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::error::CoreError;
use crate::escalation::EscalationError;

/// Metadata included in every v2 response.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: "2",
        }
    }
}

/// Successful v2 response: `{ "data": T, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Response {
        Self::with_status(StatusCode::CREATED, data)
    }

    fn with_status(status: StatusCode, data: T) -> Response {
        let body = Self {
            data,
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Error detail inside [`ApiErrorResponse`].
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error v2 response: `{ "error": { "code": "...", "message": "..." }, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(
        status: StatusCode,
        code: &str,
        msg: impl Into<String>,
        retryable: Option<bool>,
        details: Option<serde_json::Value>,
    ) -> Response {
        let body = Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: msg.into(),
                retryable,
                details,
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn not_found(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::NOT_FOUND, "NOT_FOUND", msg, None, None)
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None, None)
    }

    pub fn validation(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", msg, Some(false), None)
    }

    /// Status code and stable error code for a core error.
    pub fn status_and_code(err: &CoreError) -> (StatusCode, &'static str) {
        match err {
            CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CoreError::AlreadyCleared(_) => (StatusCode::CONFLICT, "ALREADY_CLEARED"),
            CoreError::AlreadyEscalated { .. } => (StatusCode::CONFLICT, "ALREADY_ESCALATED"),
            CoreError::Classification(_) | CoreError::ContractViolation(_) => {
                (StatusCode::BAD_GATEWAY, "CLASSIFICATION_ERROR")
            }
            CoreError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            CoreError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }

    pub fn from_core(err: &CoreError) -> Response {
        let (status, code) = Self::status_and_code(err);
        if status.is_server_error() {
            tracing::warn!(code, error = %err, "Request failed");
        }
        Self::build(status, code, err.to_string(), Some(err.is_retryable()), None)
    }

    /// Like [`Self::from_core`], but keeps the undelivered petition draft
    /// or orphaned petition id in `details`.
    pub fn from_escalation(err: &EscalationError) -> Response {
        let core = err.core();
        let (status, code) = Self::status_and_code(core);
        let details = match err {
            EscalationError::Petition { draft, .. } => {
                Some(serde_json::json!({ "pending_petition": draft }))
            }
            EscalationError::Attach { petition_id, .. } => {
                Some(serde_json::json!({ "petition_id": petition_id }))
            }
            _ => None,
        };
        tracing::warn!(code, error = %err, "Escalation failed");
        Self::build(status, code, err.to_string(), Some(core.is_retryable()), details)
    }
}
