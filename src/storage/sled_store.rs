//! Sled-backed persistence
//!
//! One named tree per record kind inside a single sled database. Values are
//! JSON. Keys:
//! - `guest_passes`: token
//! - `gate_registrations`: `condominio \0 recorded_at(be nanos) id`, so a prefix
//!   scan returns a condominium's log in append order
//! - `panic_alerts`, `bitacora`, `petitions`: record id
//! - `active_alerts`: `condominio \0 guard` -> alert id
//!
//! Single-record mutations (pass insert, alert clear, petition attach, active
//! release) go through `compare_and_swap`, so concurrent writers cannot
//! overwrite each other's transition. Raising an alert writes `panic_alerts`
//! and `active_alerts` in one multi-tree transaction.
//!
//! A record that no longer decodes fails the read with `CoreError::Store`;
//! listings never silently drop history.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};

use super::{AlertStore, BitacoraStore, PassStore, PetitionStore, RegistrationStore, Store};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    new_id, BitacoraEntry, GateRegistration, GuestPass, PanicAlert, Petition, PetitionDraft,
};

const KEY_SEPARATOR: u8 = 0;

#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    passes: Tree,
    registrations: Tree,
    alerts: Tree,
    active: Tree,
    entries: Tree,
    petitions: Tree,
}

impl SledStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self {
            passes: db.open_tree("guest_passes")?,
            registrations: db.open_tree("gate_registrations")?,
            alerts: db.open_tree("panic_alerts")?,
            active: db.open_tree("active_alerts")?,
            entries: db.open_tree("bitacora")?,
            petitions: db.open_tree("petitions")?,
            db: Arc::new(db),
        };
        tracing::info!(path = %path_ref.display(), "Sled store opened");
        Ok(store)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> CoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

fn prefixed_key(prefix: &str, rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + rest.len());
    key.extend_from_slice(prefix.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(rest);
    key
}

fn condo_prefix(condominio_id: &str) -> Vec<u8> {
    prefixed_key(condominio_id, &[])
}

fn timestamp_key(ts: DateTime<Utc>) -> [u8; 8] {
    // Sign bit flipped so pre-epoch instants still sort before post-epoch ones
    let nanos = ts
        .timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp().saturating_mul(1_000_000_000));
    #[allow(clippy::cast_sign_loss)]
    let ordered = (nanos as u64) ^ (1 << 63);
    ordered.to_be_bytes()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> CoreResult<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Decode every value in `iter`. The first unreadable record fails the scan.
fn collect_json<T: DeserializeOwned>(
    iter: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    tree_name: &'static str,
) -> CoreResult<Vec<T>> {
    let mut out = Vec::new();
    for item in iter {
        let (key, value) = item?;
        let record = serde_json::from_slice::<T>(&value).map_err(|e| {
            let key = String::from_utf8_lossy(&key);
            tracing::error!(tree = tree_name, %key, error = %e, "Undecodable record");
            CoreError::Store(format!("undecodable record in {tree_name} at key {key}: {e}"))
        })?;
        out.push(record);
    }
    Ok(out)
}

#[async_trait]
impl PassStore for SledStore {
    async fn insert_pass(&self, pass: &GuestPass) -> CoreResult<()> {
        let bytes = serde_json::to_vec(pass)?;
        let swapped = self
            .passes
            .compare_and_swap(pass.token.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
        if swapped.is_err() {
            return Err(CoreError::Validation(format!("token {} already issued", pass.token)));
        }
        Ok(())
    }

    async fn get_pass(&self, token: &str) -> CoreResult<Option<GuestPass>> {
        get_json(&self.passes, token.as_bytes())
    }

    async fn delete_pass(&self, token: &str) -> CoreResult<bool> {
        Ok(self.passes.remove(token.as_bytes())?.is_some())
    }

    async fn list_passes(&self, condominio_id: &str) -> CoreResult<Vec<GuestPass>> {
        let mut passes: Vec<GuestPass> = collect_json(self.passes.iter(), "guest_passes")?;
        passes.retain(|p| p.condominio_id == condominio_id);
        passes.sort_by_key(|p| p.issued_at);
        Ok(passes)
    }
}

#[async_trait]
impl RegistrationStore for SledStore {
    async fn append_registration(&self, registration: &GateRegistration) -> CoreResult<()> {
        let mut rest = timestamp_key(registration.recorded_at).to_vec();
        rest.extend_from_slice(registration.id.as_bytes());
        let key = prefixed_key(&registration.condominio_id, &rest);
        self.registrations.insert(key, serde_json::to_vec(registration)?)?;
        Ok(())
    }

    async fn list_registrations(&self, condominio_id: &str) -> CoreResult<Vec<GateRegistration>> {
        collect_json(
            self.registrations.scan_prefix(condo_prefix(condominio_id)),
            "gate_registrations",
        )
    }
}

#[async_trait]
impl AlertStore for SledStore {
    async fn raise_alert(&self, alert: &PanicAlert) -> CoreResult<Option<String>> {
        let record = serde_json::to_vec(alert)?;
        let pointer = prefixed_key(&alert.condominio_id, alert.guard_id.as_bytes());
        let previous = (&self.alerts, &self.active)
            .transaction(|(alerts, active)| {
                alerts.insert(alert.id.as_bytes(), record.as_slice())?;
                let previous = active.insert(pointer.as_slice(), alert.id.as_bytes())?;
                Ok::<_, ConflictableTransactionError<()>>(previous)
            })
            .map_err(|e| match e {
                TransactionError::Abort(()) => {
                    CoreError::Store(format!("raise of alert {} aborted", alert.id))
                }
                TransactionError::Storage(e) => CoreError::from(e),
            })?;
        Ok(previous.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    async fn get_alert(&self, alert_id: &str) -> CoreResult<Option<PanicAlert>> {
        get_json(&self.alerts, alert_id.as_bytes())
    }

    async fn mark_cleared(
        &self,
        alert_id: &str,
        cleared_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<(PanicAlert, bool)>> {
        loop {
            let Some(current) = self.alerts.get(alert_id.as_bytes())? else {
                return Ok(None);
            };
            let mut alert: PanicAlert = decode(&current)?;
            if alert.cleared {
                return Ok(Some((alert, false)));
            }
            alert.cleared = true;
            alert.cleared_at = Some(at);
            alert.cleared_by = cleared_by.map(str::to_string);
            let next = serde_json::to_vec(&alert)?;
            if self
                .alerts
                .compare_and_swap(alert_id.as_bytes(), Some(current), Some(next))?
                .is_ok()
            {
                return Ok(Some((alert, true)));
            }
            tracing::debug!(alert_id, "Concurrent alert update, retrying clear");
        }
    }

    async fn list_alerts(&self, condominio_id: &str) -> CoreResult<Vec<PanicAlert>> {
        let mut alerts: Vec<PanicAlert> = collect_json(self.alerts.iter(), "panic_alerts")?;
        alerts.retain(|a| a.condominio_id == condominio_id);
        alerts.sort_by(|a, b| a.raised_at.cmp(&b.raised_at).then_with(|| a.id.cmp(&b.id)));
        Ok(alerts)
    }

    async fn release_active(
        &self,
        guard_id: &str,
        condominio_id: &str,
        alert_id: &str,
    ) -> CoreResult<bool> {
        let key = prefixed_key(condominio_id, guard_id.as_bytes());
        let swapped = self
            .active
            .compare_and_swap(key, Some(alert_id.as_bytes()), None as Option<&[u8]>)?;
        Ok(swapped.is_ok())
    }

    async fn active_ids(&self, condominio_id: &str) -> CoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for item in self.active.scan_prefix(condo_prefix(condominio_id)) {
            let (_key, value) = item?;
            ids.push(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(ids)
    }
}

#[async_trait]
impl BitacoraStore for SledStore {
    async fn insert_entry(&self, entry: &BitacoraEntry) -> CoreResult<()> {
        self.entries.insert(entry.id.as_bytes(), serde_json::to_vec(entry)?)?;
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> CoreResult<Option<BitacoraEntry>> {
        get_json(&self.entries, entry_id.as_bytes())
    }

    async fn attach_petition(&self, entry_id: &str, petition_id: &str) -> CoreResult<BitacoraEntry> {
        loop {
            let current = self
                .entries
                .get(entry_id.as_bytes())?
                .ok_or_else(|| CoreError::not_found("bitacora entry", entry_id))?;
            let mut entry: BitacoraEntry = decode(&current)?;
            if let Some(existing) = entry.petition_id {
                return Err(CoreError::AlreadyEscalated {
                    entry_id: entry_id.to_string(),
                    petition_id: existing,
                });
            }
            entry.petition_id = Some(petition_id.to_string());
            let next = serde_json::to_vec(&entry)?;
            if self
                .entries
                .compare_and_swap(entry_id.as_bytes(), Some(current), Some(next))?
                .is_ok()
            {
                return Ok(entry);
            }
        }
    }

    async fn list_entries(&self, condominio_id: &str) -> CoreResult<Vec<BitacoraEntry>> {
        let mut entries: Vec<BitacoraEntry> = collect_json(self.entries.iter(), "bitacora")?;
        entries.retain(|e| e.condominio_id == condominio_id);
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}

#[async_trait]
impl PetitionStore for SledStore {
    async fn create_petition(&self, draft: &PetitionDraft) -> CoreResult<String> {
        let petition = Petition {
            id: new_id(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            condominio_id: draft.condominio_id.clone(),
            source_entry_id: draft.source_entry_id.clone(),
            created_at: Utc::now(),
        };
        self.petitions
            .insert(petition.id.as_bytes(), serde_json::to_vec(&petition)?)?;
        Ok(petition.id)
    }

    async fn get_petition(&self, petition_id: &str) -> CoreResult<Option<Petition>> {
        get_json(&self.petitions, petition_id.as_bytes())
    }

    async fn find_petition_by_source(&self, entry_id: &str) -> CoreResult<Option<Petition>> {
        let petitions: Vec<Petition> = collect_json(self.petitions.iter(), "petitions")?;
        Ok(petitions
            .into_iter()
            .filter(|p| p.source_entry_id == entry_id)
            .min_by_key(|p| p.created_at))
    }
}

impl Store for SledStore {
    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
