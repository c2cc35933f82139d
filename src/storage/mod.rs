//! Persistence contracts and backends
//!
//! The core talks to storage only through the traits below, so backends can be
//! swapped without touching the registry, gate, alert or escalation code:
//! - [`InMemoryStore`]: process-local maps for tests and minimal deployments
//! - [`SledStore`]: named sled trees under the data directory
//!
//! Every method is async because callers bound each call with a timeout
//! (see [`crate::error::bounded`]); the sled backend completes synchronously.

pub mod lockfile;
pub mod persistence;
pub mod sled_store;

pub use lockfile::ProcessLock;
pub use persistence::InMemoryStore;
pub use sled_store::SledStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{
    BitacoraEntry, GateRegistration, GuestPass, PanicAlert, Petition, PetitionDraft,
};

/// Guest-pass records, keyed by token.
#[async_trait]
pub trait PassStore: Send + Sync {
    /// Insert a new pass. Fails with `Validation` if the token already exists.
    async fn insert_pass(&self, pass: &GuestPass) -> CoreResult<()>;

    async fn get_pass(&self, token: &str) -> CoreResult<Option<GuestPass>>;

    /// Delete a pass. Returns `false` when there was nothing to delete.
    async fn delete_pass(&self, token: &str) -> CoreResult<bool>;

    async fn list_passes(&self, condominio_id: &str) -> CoreResult<Vec<GuestPass>>;
}

/// Append-only gate registration log.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn append_registration(&self, registration: &GateRegistration) -> CoreResult<()>;

    /// Registrations for a condominium, oldest first.
    async fn list_registrations(&self, condominio_id: &str) -> CoreResult<Vec<GateRegistration>>;
}

/// Panic alert history plus the keyed "active alert per guard" state.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Record a new alert and point its (guard, condominio) at it in one
    /// atomic write. Returns the previously active alert id, if any.
    async fn raise_alert(&self, alert: &PanicAlert) -> CoreResult<Option<String>>;

    async fn get_alert(&self, alert_id: &str) -> CoreResult<Option<PanicAlert>>;

    /// Set `cleared` on an uncleared alert.
    ///
    /// Returns `None` if the alert does not exist; returns the alert unchanged
    /// (with `cleared == true`) if it had already been cleared.
    async fn mark_cleared(
        &self,
        alert_id: &str,
        cleared_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<(PanicAlert, bool)>>;

    /// Every alert ever raised in a condominium, oldest first.
    async fn list_alerts(&self, condominio_id: &str) -> CoreResult<Vec<PanicAlert>>;

    /// Remove the (guard, condominio) pointer only if it still points at `alert_id`.
    async fn release_active(
        &self,
        guard_id: &str,
        condominio_id: &str,
        alert_id: &str,
    ) -> CoreResult<bool>;

    /// Active alert ids of every guard in a condominium.
    async fn active_ids(&self, condominio_id: &str) -> CoreResult<Vec<String>>;
}

/// Bitácora entries.
#[async_trait]
pub trait BitacoraStore: Send + Sync {
    async fn insert_entry(&self, entry: &BitacoraEntry) -> CoreResult<()>;

    async fn get_entry(&self, entry_id: &str) -> CoreResult<Option<BitacoraEntry>>;

    /// Attach a petition id exactly once.
    ///
    /// Fails with `NotFound` for an unknown entry and `AlreadyEscalated` if
    /// the entry already carries a petition id.
    async fn attach_petition(&self, entry_id: &str, petition_id: &str) -> CoreResult<BitacoraEntry>;

    /// Entries for a condominium, oldest first.
    async fn list_entries(&self, condominio_id: &str) -> CoreResult<Vec<BitacoraEntry>>;
}

/// Administrative petition store. Only the escalation pipeline creates petitions.
#[async_trait]
pub trait PetitionStore: Send + Sync {
    /// Create a petition and return its id.
    async fn create_petition(&self, draft: &PetitionDraft) -> CoreResult<String>;

    async fn get_petition(&self, petition_id: &str) -> CoreResult<Option<Petition>>;

    /// The petition created for a bitácora entry, if one exists.
    async fn find_petition_by_source(&self, entry_id: &str) -> CoreResult<Option<Petition>>;
}

/// Every contract at once; implemented by both backends.
pub trait Store: PassStore + RegistrationStore + AlertStore + BitacoraStore + PetitionStore {
    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
