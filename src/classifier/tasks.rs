//! The four oracle contracts

use serde_json::{json, Value};

use super::{ClassificationTask, OracleRequest};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    DocumentFieldRequest, DocumentFieldValue, EscalationSuggestion, ImageInput, PayrollAudit,
    PayrollRow, PayrollStatus, VehicleScan, VehicleType,
};

/// Guard report triage.
pub struct BinnacleTriage;

impl ClassificationTask for BinnacleTriage {
    const NAME: &'static str = "binnacle_triage";

    type Input = String;
    type Output = EscalationSuggestion;

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "suggested_action": { "type": "string", "enum": ["create_petition", "none"] },
                "title": { "type": ["string", "null"] },
                "description": { "type": ["string", "null"] }
            },
            "required": ["suggested_action", "title", "description"],
            "additionalProperties": false
        })
    }

    fn request(report: &String) -> CoreResult<OracleRequest> {
        let report = report.trim();
        if report.is_empty() {
            return Err(CoreError::Validation("report text is empty".to_string()));
        }
        Ok(OracleRequest {
            task: Self::NAME,
            instructions: "You review security guard log entries of a residential condominium. \
                Decide whether the entry describes a problem the administration must act on \
                (damage, leaks, failures, safety hazards, repeated incidents). If so, answer \
                suggested_action \"create_petition\" with a short title and a description of \
                the work needed. Routine activity answers \"none\" with null title and description."
                .to_string(),
            text: Some(report.to_string()),
            image: None,
            schema: Self::output_schema(),
        })
    }
}

/// Payroll anomaly detection.
pub struct PayrollReview;

impl ClassificationTask for PayrollReview {
    const NAME: &'static str = "payroll_review";

    type Input = Vec<PayrollRow>;
    type Output = PayrollAudit;

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["ok", "anomalies_found"] },
                "anomalies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "employee": { "type": "string" },
                            "field": { "type": "string", "enum": PayrollRow::FIELDS },
                            "description": { "type": "string" }
                        },
                        "required": ["employee", "field", "description"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["status", "anomalies"],
            "additionalProperties": false
        })
    }

    fn request(rows: &Vec<PayrollRow>) -> CoreResult<OracleRequest> {
        if rows.is_empty() {
            return Err(CoreError::Validation("payroll has no rows".to_string()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.employee.trim().is_empty() {
                return Err(CoreError::Validation(format!("row {i}: employee is empty")));
            }
            let numbers = [
                ("hours_worked", row.hours_worked),
                ("hourly_rate", row.hourly_rate),
                ("deductions", row.deductions),
                ("total_paid", row.total_paid),
            ];
            if let Some((field, _)) = numbers.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
                return Err(CoreError::Validation(format!(
                    "row {i}: {field} must be a non-negative number"
                )));
            }
        }

        let text = serde_json::to_string(rows)
            .map_err(|e| CoreError::Validation(format!("payroll rows: {e}")))?;
        Ok(OracleRequest {
            task: Self::NAME,
            instructions: "You audit the payroll of condominium staff. Each row lists hours \
                worked, hourly rate, deductions and the total actually paid. Report every row \
                whose values are implausible or inconsistent (for example total_paid differing \
                from hours_worked * hourly_rate - deductions, or excessive hours). Use status \
                \"ok\" with an empty list when nothing is wrong."
                .to_string(),
            text: Some(text),
            image: None,
            schema: Self::output_schema(),
        })
    }

    fn validate(rows: &Vec<PayrollRow>, audit: &PayrollAudit) -> CoreResult<()> {
        match (audit.status, audit.anomalies.is_empty()) {
            (PayrollStatus::Ok, false) => {
                return Err(CoreError::ContractViolation(
                    "status ok but anomalies were listed".to_string(),
                ))
            }
            (PayrollStatus::AnomaliesFound, true) => {
                return Err(CoreError::ContractViolation(
                    "status anomalies_found with an empty anomaly list".to_string(),
                ))
            }
            _ => {}
        }

        for anomaly in &audit.anomalies {
            if !rows.iter().any(|r| r.employee == anomaly.employee) {
                return Err(CoreError::ContractViolation(format!(
                    "anomaly names unknown employee '{}'",
                    anomaly.employee
                )));
            }
        }
        Ok(())
    }
}

/// Vehicle attribute extraction from a gate camera frame.
pub struct VehicleAttributeScan;

impl ClassificationTask for VehicleAttributeScan {
    const NAME: &'static str = "vehicle_scan";

    type Input = ImageInput;
    type Output = VehicleScan;

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "vehicle_type": { "type": "string", "enum": VehicleType::ALL },
                "brand": { "type": "string" },
                "color": { "type": "string" },
                "plate": { "type": "string" }
            },
            "required": ["vehicle_type", "brand", "color", "plate"],
            "additionalProperties": false
        })
    }

    fn request(image: &ImageInput) -> CoreResult<OracleRequest> {
        Ok(OracleRequest {
            task: Self::NAME,
            instructions: "Identify the vehicle in the photo: its type, brand, dominant color \
                and license plate. Use an empty string for a plate that cannot be read."
                .to_string(),
            text: None,
            image: Some(image.clone()),
            schema: Self::output_schema(),
        })
    }
}

/// Single field extraction from an identity document or delivery slip.
pub struct DocumentFieldExtraction;

impl ClassificationTask for DocumentFieldExtraction {
    const NAME: &'static str = "document_field";

    type Input = DocumentFieldRequest;
    type Output = DocumentFieldValue;

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "value": { "type": "string" } },
            "required": ["value"],
            "additionalProperties": false
        })
    }

    fn request(input: &DocumentFieldRequest) -> CoreResult<OracleRequest> {
        let field = input.field.trim();
        if field.is_empty() {
            return Err(CoreError::Validation("document field name is empty".to_string()));
        }
        Ok(OracleRequest {
            task: Self::NAME,
            instructions: format!(
                "Read the document in the photo and return the value of its \"{field}\" field \
                 as plain text. Return an empty string if the field is not present or illegible."
            ),
            text: Some(field.to_string()),
            image: Some(input.image.clone()),
            schema: Self::output_schema(),
        })
    }
}
