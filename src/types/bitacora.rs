//! Guard log (bitácora) entries, escalation suggestions and petitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-text guard report. Mutated at most once, to attach a petition id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitacoraEntry {
    pub id: String,
    pub author_id: String,
    pub condominio_id: String,
    pub report: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub petition_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    CreatePetition,
    None,
}

/// Transient triage result for one report. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationSuggestion {
    pub suggested_action: SuggestedAction,
    #[serde(deserialize_with = "Option::deserialize")]
    pub title: Option<String>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub description: Option<String>,
}

/// Title and description of a petition about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetitionDraft {
    pub title: String,
    pub description: String,
    pub condominio_id: String,
    /// Bitácora entry the petition was escalated from
    pub source_entry_id: String,
}

/// Administrative work item held by the petition store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Petition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub condominio_id: String,
    pub source_entry_id: String,
    pub created_at: DateTime<Utc>,
}

/// What happened to a bitácora entry after it went through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    NoAction,
    Escalated {
        petition_id: String,
        title: String,
        description: String,
    },
    /// Entry already carried a petition id; the oracle was not consulted
    AlreadyEscalated { petition_id: String },
}
