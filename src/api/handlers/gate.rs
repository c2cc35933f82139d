//! Gate endpoints: admission, camera-assisted admission, audit log

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{decode_image, ApiState};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{AccessType, Admission, RegistrationAttempt, VehicleAttributes, VehicleScan};

/// Entry attempt as posted by the guard booth. `entered_at` defaults to now.
#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub access_type: AccessType,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub entered_at: Option<DateTime<Utc>>,
    pub condominio_id: String,
    #[serde(default)]
    pub residence_id: Option<String>,
    #[serde(default)]
    pub visitor_name: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleAttributes>,
}

impl From<AdmitRequest> for RegistrationAttempt {
    fn from(req: AdmitRequest) -> Self {
        Self {
            access_type: req.access_type,
            token: req.token,
            entered_at: req.entered_at.unwrap_or_else(Utc::now),
            condominio_id: req.condominio_id,
            residence_id: req.residence_id,
            visitor_name: req.visitor_name,
            vehicle: req.vehicle,
        }
    }
}

/// Vehicular entry with a camera frame instead of typed-in attributes.
#[derive(Debug, Deserialize)]
pub struct VehicleScanRequest {
    /// Base64 image or `data:` URL
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub condominio_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub entered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub residence_id: Option<String>,
    #[serde(default)]
    pub visitor_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VehicleScanResponse {
    pub scan: VehicleScan,
    pub admission: Admission,
}

/// POST /api/v2/gate/admit
pub async fn admit(State(state): State<ApiState>, Json(req): Json<AdmitRequest>) -> Response {
    match state.services.gate.admit(req.into()).await {
        Ok(admission) => ApiResponse::ok(admission),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// POST /api/v2/gate/vehicle-scan
///
/// Extracts type/brand/color/plate from the photo, then admits with those
/// attributes. A failed extraction records nothing.
pub async fn vehicle_scan(
    State(state): State<ApiState>,
    Json(req): Json<VehicleScanRequest>,
) -> Response {
    let image = match decode_image(&req.image, req.mime_type.as_deref()) {
        Ok(image) => image,
        Err(resp) => return resp,
    };

    let scan = match state.services.classifier.scan_vehicle(&image).await {
        Ok(scan) => scan,
        Err(e) => return ApiErrorResponse::from_core(&e),
    };

    let attempt = RegistrationAttempt {
        access_type: AccessType::Vehicular,
        token: req.token,
        entered_at: req.entered_at.unwrap_or_else(Utc::now),
        condominio_id: req.condominio_id,
        residence_id: req.residence_id,
        visitor_name: req.visitor_name,
        vehicle: Some(VehicleAttributes {
            plate: scan.plate.clone(),
            brand: scan.brand.clone(),
            color: scan.color.clone(),
        }),
    };

    match state.services.gate.admit(attempt).await {
        Ok(admission) => ApiResponse::ok(VehicleScanResponse { scan, admission }),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/condominios/:id/registrations
pub async fn list_registrations(
    State(state): State<ApiState>,
    Path(condominio_id): Path<String>,
) -> Response {
    match state.services.gate.registrations(&condominio_id).await {
        Ok(registrations) => ApiResponse::ok(registrations),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}
