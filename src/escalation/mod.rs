//! Bitácora Escalation Pipeline
//!
//! Turns guard log entries into administrative petitions:
//!
//! 1. triage the report text with the [`EscalationClassifier`]
//! 2. `none` -> `NoAction`, entry untouched
//! 3. `create_petition` -> title and description are mandatory, then the
//!    petition is created and its id attached to the entry exactly once
//!
//! Failures are surfaced, never downgraded. A petition-store failure after a
//! successful triage carries the draft in the error so the caller can retry
//! or file it by hand. A petition that was created but never attached is
//! found by its source entry on the next run and attached instead of
//! creating a second one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::EscalationClassifier;
use crate::error::{bounded, CoreError, CoreResult};
use crate::storage::{BitacoraStore, PetitionStore};
use crate::types::{
    new_id, BitacoraEntry, EscalationOutcome, EscalationSuggestion, Petition, PetitionDraft,
    SuggestedAction,
};

#[derive(Error, Debug)]
pub enum EscalationError {
    /// Triage failed; the entry stays un-escalated.
    #[error("classification of entry {entry_id} failed: {source}")]
    Classification {
        entry_id: String,
        #[source]
        source: CoreError,
    },

    /// Triage asked for a petition but the petition store refused it.
    #[error("petition for entry {entry_id} was not created: {source}")]
    Petition {
        entry_id: String,
        draft: PetitionDraft,
        #[source]
        source: CoreError,
    },

    /// Petition exists but the entry could not be linked to it.
    #[error("petition {petition_id} created but not attached to entry {entry_id}: {source}")]
    Attach {
        entry_id: String,
        petition_id: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EscalationError {
    /// Underlying core error, for status mapping and retry decisions.
    pub fn core(&self) -> &CoreError {
        match self {
            EscalationError::Classification { source, .. }
            | EscalationError::Petition { source, .. }
            | EscalationError::Attach { source, .. } => source,
            EscalationError::Core(e) => e,
        }
    }

    /// The escalation that was decided but not stored, if any.
    pub fn pending_draft(&self) -> Option<&PetitionDraft> {
        match self {
            EscalationError::Petition { draft, .. } => Some(draft),
            _ => None,
        }
    }
}

pub type EscalationResult<T> = Result<T, EscalationError>;

/// Result of one entry in a [`BitacoraEscalationPipeline::process_pending`] batch.
#[derive(Debug)]
pub struct PendingResult {
    pub entry_id: String,
    pub result: EscalationResult<EscalationOutcome>,
}

pub struct BitacoraEscalationPipeline {
    classifier: Arc<EscalationClassifier>,
    entries: Arc<dyn BitacoraStore>,
    petitions: Arc<dyn PetitionStore>,
    store_timeout: Duration,
    petition_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes an entry id from the in-flight set when processing ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    entry_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.entry_id);
        }
    }
}

impl BitacoraEscalationPipeline {
    pub fn new(
        classifier: Arc<EscalationClassifier>,
        entries: Arc<dyn BitacoraStore>,
        petitions: Arc<dyn PetitionStore>,
        store_timeout: Duration,
        petition_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            entries,
            petitions,
            store_timeout,
            petition_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Store a new guard report.
    pub async fn record(
        &self,
        author_id: &str,
        condominio_id: &str,
        report: &str,
    ) -> CoreResult<BitacoraEntry> {
        let report = report.trim();
        if report.is_empty() {
            return Err(CoreError::Validation("report must not be empty".to_string()));
        }
        if author_id.trim().is_empty() || condominio_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "author_id and condominio_id are required".to_string(),
            ));
        }

        let entry = BitacoraEntry {
            id: new_id(),
            author_id: author_id.to_string(),
            condominio_id: condominio_id.to_string(),
            report: report.to_string(),
            created_at: Utc::now(),
            petition_id: None,
        };
        bounded("bitacora.insert", self.store_timeout, self.entries.insert_entry(&entry)).await?;
        debug!(entry_id = %entry.id, condominio = condominio_id, "Bitácora entry recorded");
        Ok(entry)
    }

    pub async fn get_entry(&self, entry_id: &str) -> CoreResult<BitacoraEntry> {
        bounded("bitacora.get", self.store_timeout, self.entries.get_entry(entry_id))
            .await?
            .ok_or_else(|| CoreError::not_found("bitacora entry", entry_id))
    }

    pub async fn list_entries(&self, condominio_id: &str) -> CoreResult<Vec<BitacoraEntry>> {
        bounded("bitacora.list", self.store_timeout, self.entries.list_entries(condominio_id)).await
    }

    pub async fn get_petition(&self, petition_id: &str) -> CoreResult<Petition> {
        bounded("petition.get", self.store_timeout, self.petitions.get_petition(petition_id))
            .await?
            .ok_or_else(|| CoreError::not_found("petition", petition_id))
    }

    /// Run one entry through triage and, if asked for, petition creation.
    ///
    /// An entry that already carries a petition id short-circuits to
    /// `AlreadyEscalated` without consulting the oracle. So does an entry
    /// whose petition exists but was left unattached; it is attached and
    /// reported as `Escalated`.
    pub async fn process_entry(&self, entry_id: &str) -> EscalationResult<EscalationOutcome> {
        let _in_flight = self.claim(entry_id)?;

        let entry = self.get_entry(entry_id).await?;
        if let Some(petition_id) = &entry.petition_id {
            debug!(entry_id, %petition_id, "Entry already escalated");
            return Ok(EscalationOutcome::AlreadyEscalated { petition_id: petition_id.clone() });
        }

        let orphan = bounded(
            "petition.find_by_source",
            self.petition_timeout,
            self.petitions.find_petition_by_source(entry_id),
        )
        .await?;
        if let Some(petition) = orphan {
            self.attach(entry_id, &petition.id).await?;
            info!(entry_id, petition_id = %petition.id, "Unattached petition linked to its entry");
            return Ok(EscalationOutcome::Escalated {
                petition_id: petition.id,
                title: petition.title,
                description: petition.description,
            });
        }

        let suggestion = self.classifier.triage(&entry.report).await.map_err(|source| {
            warn!(entry_id, error = %source, "Bitácora triage failed");
            EscalationError::Classification { entry_id: entry_id.to_string(), source }
        })?;

        let draft = match petition_draft(&entry, suggestion) {
            Ok(None) => {
                debug!(entry_id, "Triage suggested no action");
                return Ok(EscalationOutcome::NoAction);
            }
            Ok(Some(draft)) => draft,
            Err(source) => {
                warn!(entry_id, error = %source, "Triage returned an inconsistent suggestion");
                return Err(EscalationError::Classification { entry_id: entry_id.to_string(), source });
            }
        };

        let petition_id = match bounded(
            "petition.create",
            self.petition_timeout,
            self.petitions.create_petition(&draft),
        )
        .await
        {
            Ok(id) => id,
            Err(source) => {
                warn!(entry_id, title = %draft.title, error = %source, "Petition creation failed");
                return Err(EscalationError::Petition { entry_id: entry_id.to_string(), draft, source });
            }
        };

        self.attach(entry_id, &petition_id).await?;

        info!(
            entry_id,
            %petition_id,
            condominio = %draft.condominio_id,
            title = %draft.title,
            "Bitácora entry escalated to petition"
        );
        Ok(EscalationOutcome::Escalated {
            petition_id,
            title: draft.title,
            description: draft.description,
        })
    }

    /// Process every un-escalated entry of a condominium, oldest first.
    /// One failing entry does not stop the batch.
    pub async fn process_pending(&self, condominio_id: &str) -> CoreResult<Vec<PendingResult>> {
        let pending: Vec<String> = self
            .list_entries(condominio_id)
            .await?
            .into_iter()
            .filter(|e| e.petition_id.is_none())
            .map(|e| e.id)
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for entry_id in pending {
            let result = self.process_entry(&entry_id).await;
            results.push(PendingResult { entry_id, result });
        }

        let failed = results.iter().filter(|r| r.result.is_err()).count();
        info!(
            condominio = condominio_id,
            processed = results.len(),
            failed,
            "Pending bitácora entries processed"
        );
        Ok(results)
    }

    async fn attach(&self, entry_id: &str, petition_id: &str) -> EscalationResult<()> {
        bounded(
            "bitacora.attach_petition",
            self.store_timeout,
            self.entries.attach_petition(entry_id, petition_id),
        )
        .await
        .map_err(|source| {
            warn!(entry_id, petition_id, error = %source, "Petition created but not attached");
            EscalationError::Attach {
                entry_id: entry_id.to_string(),
                petition_id: petition_id.to_string(),
                source,
            }
        })?;
        Ok(())
    }

    fn claim(&self, entry_id: &str) -> EscalationResult<InFlight<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| CoreError::Store("escalation in-flight set poisoned".to_string()))?;
        if !set.insert(entry_id.to_string()) {
            return Err(CoreError::Validation(format!(
                "escalation of entry {entry_id} is already in progress"
            ))
            .into());
        }
        Ok(InFlight { set: &self.in_flight, entry_id: entry_id.to_string() })
    }
}

/// `Ok(None)` for no action; a petition request missing its title or
/// description is a contract violation.
fn petition_draft(
    entry: &BitacoraEntry,
    suggestion: EscalationSuggestion,
) -> CoreResult<Option<PetitionDraft>> {
    match suggestion.suggested_action {
        SuggestedAction::None => Ok(None),
        SuggestedAction::CreatePetition => {
            let title = non_blank(suggestion.title);
            let description = non_blank(suggestion.description);
            match (title, description) {
                (Some(title), Some(description)) => Ok(Some(PetitionDraft {
                    title,
                    description,
                    condominio_id: entry.condominio_id.clone(),
                    source_entry_id: entry.id.clone(),
                })),
                (title, description) => Err(CoreError::ContractViolation(format!(
                    "create_petition without {}",
                    match (title.is_none(), description.is_none()) {
                        (true, true) => "title and description",
                        (true, false) => "title",
                        _ => "description",
                    }
                ))),
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BinnacleTriage, ClassificationTask, ScriptedOracle};
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        oracle: Arc<ScriptedOracle>,
        store: Arc<InMemoryStore>,
        pipeline: BitacoraEscalationPipeline,
    }

    fn fixture_with(oracle: ScriptedOracle) -> Fixture {
        let oracle = Arc::new(oracle);
        let store = Arc::new(InMemoryStore::new());
        let classifier = Arc::new(EscalationClassifier::new(
            oracle.clone(),
            Duration::from_secs(1),
            1024,
        ));
        let pipeline = BitacoraEscalationPipeline::new(
            classifier,
            store.clone(),
            store.clone(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        Fixture { oracle, store, pipeline }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedOracle::new())
    }

    struct BrokenPetitions;

    #[async_trait]
    impl PetitionStore for BrokenPetitions {
        async fn create_petition(&self, _draft: &PetitionDraft) -> CoreResult<String> {
            Err(CoreError::Store("petition service down".to_string()))
        }
        async fn get_petition(&self, _petition_id: &str) -> CoreResult<Option<Petition>> {
            Ok(None)
        }
        async fn find_petition_by_source(&self, _entry_id: &str) -> CoreResult<Option<Petition>> {
            Ok(None)
        }
    }

    /// Refuses the first `failures` attach calls.
    struct FlakyAttach {
        inner: Arc<InMemoryStore>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl BitacoraStore for FlakyAttach {
        async fn insert_entry(&self, entry: &BitacoraEntry) -> CoreResult<()> {
            self.inner.insert_entry(entry).await
        }
        async fn get_entry(&self, entry_id: &str) -> CoreResult<Option<BitacoraEntry>> {
            self.inner.get_entry(entry_id).await
        }
        async fn attach_petition(
            &self,
            entry_id: &str,
            petition_id: &str,
        ) -> CoreResult<BitacoraEntry> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(CoreError::Store("bitacora tree unavailable".to_string()));
            }
            self.inner.attach_petition(entry_id, petition_id).await
        }
        async fn list_entries(&self, condominio_id: &str) -> CoreResult<Vec<BitacoraEntry>> {
            self.inner.list_entries(condominio_id).await
        }
    }

    #[tokio::test]
    async fn test_routine_report_is_no_action() {
        let f = fixture();
        let entry = f
            .pipeline
            .record("guard-1", "c1", "routine patrol completed, nothing to report")
            .await
            .unwrap();
        let out = f.pipeline.process_entry(&entry.id).await.unwrap();
        assert_eq!(out, EscalationOutcome::NoAction);
        assert!(f.pipeline.get_entry(&entry.id).await.unwrap().petition_id.is_none());
    }

    #[tokio::test]
    async fn test_leak_report_creates_petition() {
        let f = fixture();
        let entry = f
            .pipeline
            .record("guard-1", "c1", "water leak detected in parking garage")
            .await
            .unwrap();

        let out = f.pipeline.process_entry(&entry.id).await.unwrap();
        let EscalationOutcome::Escalated { petition_id, title, description } = out else {
            panic!("expected escalation, got {out:?}");
        };
        assert!(!title.is_empty());
        assert!(!description.is_empty());

        let stored = f.pipeline.get_entry(&entry.id).await.unwrap();
        assert_eq!(stored.petition_id.as_deref(), Some(petition_id.as_str()));
        let petition = f.pipeline.get_petition(&petition_id).await.unwrap();
        assert_eq!(petition.source_entry_id, entry.id);
        assert_eq!(petition.condominio_id, "c1");
    }

    #[tokio::test]
    async fn test_second_run_does_not_consult_oracle() {
        let f = fixture();
        let entry = f.pipeline.record("g", "c1", "pipe leak in lobby").await.unwrap();
        f.pipeline.process_entry(&entry.id).await.unwrap();
        let calls = f.oracle.calls();

        let again = f.pipeline.process_entry(&entry.id).await.unwrap();
        assert!(matches!(again, EscalationOutcome::AlreadyEscalated { .. }));
        assert_eq!(f.oracle.calls(), calls);
    }

    #[tokio::test]
    async fn test_missing_title_is_contract_violation() {
        let f = fixture_with(ScriptedOracle::new().with_response(
            BinnacleTriage::NAME,
            json!({"suggested_action": "create_petition", "title": null, "description": "fix it"}),
        ));
        let entry = f.pipeline.record("g", "c1", "something broke").await.unwrap();

        let err = f.pipeline.process_entry(&entry.id).await.unwrap_err();
        assert!(matches!(
            err,
            EscalationError::Classification { source: CoreError::ContractViolation(_), .. }
        ));
        assert!(err.core().is_classification());
        assert!(f.pipeline.get_entry(&entry.id).await.unwrap().petition_id.is_none());
    }

    #[tokio::test]
    async fn test_schema_invalid_triage_is_surfaced() {
        let f = fixture_with(
            ScriptedOracle::new().with_response(BinnacleTriage::NAME, json!({"verdict": "none"})),
        );
        let entry = f.pipeline.record("g", "c1", "routine patrol").await.unwrap();
        let err = f.pipeline.process_entry(&entry.id).await.unwrap_err();
        assert!(matches!(err.core(), CoreError::Classification(_)));
        assert!(err.core().is_retryable());
    }

    #[tokio::test]
    async fn test_petition_failure_keeps_draft() {
        let oracle = Arc::new(ScriptedOracle::new());
        let store = Arc::new(InMemoryStore::new());
        let classifier =
            Arc::new(EscalationClassifier::new(oracle, Duration::from_secs(1), 1024));
        let pipeline = BitacoraEscalationPipeline::new(
            classifier,
            store.clone(),
            Arc::new(BrokenPetitions),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let entry = pipeline.record("g", "c1", "water leak in gym").await.unwrap();
        let err = pipeline.process_entry(&entry.id).await.unwrap_err();
        let draft = err.pending_draft().unwrap();
        assert_eq!(draft.source_entry_id, entry.id);
        assert!(!draft.title.is_empty());
        assert!(pipeline.get_entry(&entry.id).await.unwrap().petition_id.is_none());
    }

    #[tokio::test]
    async fn test_retry_after_attach_failure_reuses_petition() {
        let oracle = Arc::new(ScriptedOracle::new());
        let store = Arc::new(InMemoryStore::new());
        let classifier =
            Arc::new(EscalationClassifier::new(oracle.clone(), Duration::from_secs(1), 1024));
        let pipeline = BitacoraEscalationPipeline::new(
            classifier,
            Arc::new(FlakyAttach { inner: store.clone(), failures: AtomicUsize::new(1) }),
            store.clone(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let entry = pipeline.record("g", "c1", "water leak in gym").await.unwrap();
        let err = pipeline.process_entry(&entry.id).await.unwrap_err();
        let EscalationError::Attach { petition_id: created, .. } = err else {
            panic!("expected an attach failure");
        };
        assert_eq!(oracle.calls(), 1);

        let out = pipeline.process_entry(&entry.id).await.unwrap();
        let EscalationOutcome::Escalated { petition_id, .. } = out else {
            panic!("expected the existing petition to be attached");
        };
        assert_eq!(petition_id, created);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(
            store.get_entry(&entry.id).await.unwrap().unwrap().petition_id.as_deref(),
            Some(created.as_str())
        );
        let found = store.find_petition_by_source(&entry.id).await.unwrap().unwrap();
        assert_eq!(found.id, created);
    }

    #[tokio::test]
    async fn test_process_pending_collects_every_result() {
        let f = fixture();
        f.pipeline.record("g", "c1", "routine patrol completed").await.unwrap();
        f.pipeline.record("g", "c1", "water leak near pool").await.unwrap();
        f.pipeline.record("g", "c2", "water leak elsewhere").await.unwrap();

        let results = f.pipeline.process_pending("c1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.result.is_ok()));

        // Escalated entries drop out of the pending set
        let again = f.pipeline.process_pending("c1").await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(f.store.list_entries("c2").await.unwrap()[0].petition_id, None);
    }

    #[tokio::test]
    async fn test_unknown_entry_not_found() {
        let f = fixture();
        let err = f.pipeline.process_entry("missing").await.unwrap_err();
        assert!(matches!(err, EscalationError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_report_rejected() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.record("g", "c1", "  ").await,
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_draft_trims_and_requires_both_fields() {
        let entry = BitacoraEntry {
            id: "e1".to_string(),
            author_id: "g".to_string(),
            condominio_id: "c1".to_string(),
            report: "r".to_string(),
            created_at: Utc::now(),
            petition_id: None,
        };
        let ok = petition_draft(
            &entry,
            EscalationSuggestion {
                suggested_action: SuggestedAction::CreatePetition,
                title: Some(" Leak ".to_string()),
                description: Some("Fix".to_string()),
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(ok.title, "Leak");

        let err = petition_draft(
            &entry,
            EscalationSuggestion {
                suggested_action: SuggestedAction::CreatePetition,
                title: Some("Leak".to_string()),
                description: Some("  ".to_string()),
            },
        );
        assert!(matches!(err, Err(CoreError::ContractViolation(_))));
    }
}
