//! Input and output payloads of the classification oracle
//!
//! Output types reject unknown fields so that an oracle drifting from its
//! schema is caught at parse time rather than half-understood.

use serde::{Deserialize, Serialize};

/// Image handed to the oracle, e.g. a gate camera frame or an ID scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    pub const ACCEPTED_MIME_TYPES: &'static [&'static str] =
        &["image/jpeg", "image/png", "image/webp"];

    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self { mime_type: mime_type.into(), data }
    }

    pub fn is_accepted_mime(&self) -> bool {
        Self::ACCEPTED_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

// ============================================================================
// Payroll
// ============================================================================

/// One employee line of a payroll period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRow {
    pub employee: String,
    pub role: String,
    pub hours_worked: f64,
    pub hourly_rate: f64,
    #[serde(default)]
    pub deductions: f64,
    pub total_paid: f64,
}

impl PayrollRow {
    /// Field names an anomaly may point at.
    pub const FIELDS: &'static [&'static str] = &[
        "employee",
        "role",
        "hours_worked",
        "hourly_rate",
        "deductions",
        "total_paid",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Ok,
    AnomaliesFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayrollAnomaly {
    pub employee: String,
    pub field: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayrollAudit {
    pub status: PayrollStatus,
    pub anomalies: Vec<PayrollAnomaly>,
}

// ============================================================================
// Vehicle scan
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Suv,
    Pickup,
    Van,
    Motorcycle,
    Truck,
    Bus,
    Other,
}

impl VehicleType {
    pub const ALL: &'static [&'static str] =
        &["car", "suv", "pickup", "van", "motorcycle", "truck", "bus", "other"];
}

/// Visual attributes read off a vehicle photo. `plate` is `""` when unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleScan {
    pub vehicle_type: VehicleType,
    pub brand: String,
    pub color: String,
    pub plate: String,
}

// ============================================================================
// Document field
// ============================================================================

/// Ask for one named field (e.g. "full name") on a document image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFieldRequest {
    pub field: String,
    pub image: ImageInput,
}

/// Extracted value; the empty string is the "not found" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentFieldValue {
    pub value: String,
}

impl DocumentFieldValue {
    pub fn is_found(&self) -> bool {
        !self.value.trim().is_empty()
    }
}
