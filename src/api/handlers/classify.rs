//! Direct classification endpoints (payroll review, document fields)

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{decode_image, ApiState};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{DocumentFieldRequest, PayrollRow};

#[derive(Debug, Deserialize)]
pub struct PayrollRequest {
    pub rows: Vec<PayrollRow>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    /// Field to read, e.g. "full name"
    pub field: String,
    /// Base64 image or `data:` URL
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub field: String,
    pub value: String,
    pub found: bool,
}

/// POST /api/v2/classify/payroll
pub async fn classify_payroll(
    State(state): State<ApiState>,
    Json(req): Json<PayrollRequest>,
) -> Response {
    match state.services.classifier.review_payroll(&req.rows).await {
        Ok(audit) => ApiResponse::ok(audit),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// POST /api/v2/classify/document
pub async fn classify_document(
    State(state): State<ApiState>,
    Json(req): Json<DocumentRequest>,
) -> Response {
    let image = match decode_image(&req.image, req.mime_type.as_deref()) {
        Ok(image) => image,
        Err(resp) => return resp,
    };
    let request = DocumentFieldRequest { field: req.field, image };

    match state.services.classifier.extract_document_field(&request).await {
        Ok(value) => ApiResponse::ok(DocumentResponse {
            found: value.is_found(),
            field: request.field,
            value: value.value,
        }),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}
