//! Panic alert types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A panic alert raised by a guard. Retained for audit; only `clear` mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicAlert {
    pub id: String,
    pub guard_id: String,
    pub condominio_id: String,
    pub raised_at: DateTime<Utc>,
    pub cleared: bool,
    #[serde(default)]
    pub cleared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cleared_by: Option<String>,
}

/// State change published to administrator sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "alert", rename_all = "snake_case")]
pub enum AlertEvent {
    Raised(PanicAlert),
    Cleared(PanicAlert),
}

impl AlertEvent {
    pub fn alert(&self) -> &PanicAlert {
        match self {
            AlertEvent::Raised(a) | AlertEvent::Cleared(a) => a,
        }
    }

    pub fn condominio_id(&self) -> &str {
        &self.alert().condominio_id
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlertEvent::Raised(_) => "raised",
            AlertEvent::Cleared(_) => "cleared",
        }
    }
}
