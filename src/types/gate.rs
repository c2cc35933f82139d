//! Gate registration types: attempts, decisions and the append-only audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessType, GuestPass};

/// Vehicle attributes captured at the gate, typed in by the guard or
/// extracted from a camera frame by the classification oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub color: String,
}

/// One physical entry attempt as seen by the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAttempt {
    pub access_type: AccessType,
    /// Scanned guest-pass token, if the visitor presented one
    #[serde(default)]
    pub token: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub condominio_id: String,
    /// Residence / address the visitor is heading to
    #[serde(default)]
    pub residence_id: Option<String>,
    #[serde(default)]
    pub visitor_name: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleAttributes>,
}

/// Why a presented credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UnknownCredential,
    TypeMismatch,
    Expired,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::UnknownCredential => write!(f, "unknown credential"),
            DenyReason::TypeMismatch => write!(f, "access type mismatch"),
            DenyReason::Expired => write!(f, "credential expired"),
        }
    }
}

/// Outcome of a gate admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// No credential presented; recorded, never denied
    AdmitUnverified,
    Admit { pass: GuestPass },
    Deny { reason: DenyReason },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Deny { .. })
    }

    /// Compact form stored on the audit record.
    pub fn outcome(&self) -> GateOutcome {
        match self {
            Decision::AdmitUnverified => GateOutcome::AdmittedUnverified,
            Decision::Admit { .. } => GateOutcome::Admitted,
            Decision::Deny { reason } => GateOutcome::Denied { reason: *reason },
        }
    }
}

/// Decision outcome as persisted on a [`GateRegistration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Admitted,
    AdmittedUnverified,
    Denied { reason: DenyReason },
}

/// Append-only audit record: exactly one per admission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRegistration {
    pub id: String,
    pub access_type: AccessType,
    pub entered_at: DateTime<Utc>,
    pub condominio_id: String,
    #[serde(default)]
    pub residence_id: Option<String>,
    /// Token as presented, kept on denials too
    #[serde(default)]
    pub guest_token: Option<String>,
    #[serde(default)]
    pub visitor_name: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleAttributes>,
    #[serde(flatten)]
    pub outcome: GateOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Result of [`crate::gate::GateMatcher::admit`]: the decision plus its audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub decision: Decision,
    pub registration: GateRegistration,
}
