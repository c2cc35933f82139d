//! Guest-pass credential types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a visitor physically enters the condominium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Vehicular,
    Pedestrian,
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessType::Vehicular => write!(f, "vehicular"),
            AccessType::Pedestrian => write!(f, "pedestrian"),
        }
    }
}

/// Who the visitor is relative to the residence that invited them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorCategory {
    #[default]
    Guest,
    Family,
    Service,
    Delivery,
    Other,
}

/// Validity window of a pass.
///
/// The expiry exists only for bounded passes, so "expiry present iff
/// bounded" holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Validity {
    Permanent,
    Bounded { expires_at: DateTime<Utc> },
}

impl Validity {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Validity::Permanent => None,
            Validity::Bounded { expires_at } => Some(*expires_at),
        }
    }
}

/// An issued guest pass. Never mutated after issuance; revocation deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestPass {
    /// Opaque unique token: primary key and QR payload
    pub token: String,
    pub guest_name: String,
    pub access_type: AccessType,
    /// Present iff `access_type` is vehicular
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub category: VisitorCategory,
    #[serde(flatten)]
    pub validity: Validity,
    pub issued_at: DateTime<Utc>,
    pub condominio_id: String,
    pub residence_id: String,
}

/// Issuance request for a new pass. The token is always generated by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestPassSpec {
    pub guest_name: String,
    pub access_type: AccessType,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub category: VisitorCategory,
    #[serde(flatten)]
    pub validity: Validity,
    pub condominio_id: String,
    pub residence_id: String,
}
