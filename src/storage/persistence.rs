//! In-memory persistence for tests and minimal deployments
//!
//! Thread-safe via `RwLock`. Not durable; data is lost on restart.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AlertStore, BitacoraStore, PassStore, PetitionStore, RegistrationStore, Store};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    new_id, BitacoraEntry, GateRegistration, GuestPass, PanicAlert, Petition, PetitionDraft,
};

#[derive(Default)]
struct Tables {
    passes: HashMap<String, GuestPass>,
    registrations: Vec<GateRegistration>,
    alerts: HashMap<String, PanicAlert>,
    /// (guard_id, condominio_id) -> alert id
    active: HashMap<(String, String), String>,
    entries: HashMap<String, BitacoraEntry>,
    petitions: HashMap<String, Petition>,
}

/// Process-local store backed by hash maps.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|e| CoreError::Store(e.to_string()))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|e| CoreError::Store(e.to_string()))
    }
}

#[async_trait]
impl PassStore for InMemoryStore {
    async fn insert_pass(&self, pass: &GuestPass) -> CoreResult<()> {
        let mut t = self.write()?;
        if t.passes.contains_key(&pass.token) {
            return Err(CoreError::Validation(format!("token {} already issued", pass.token)));
        }
        t.passes.insert(pass.token.clone(), pass.clone());
        Ok(())
    }

    async fn get_pass(&self, token: &str) -> CoreResult<Option<GuestPass>> {
        Ok(self.read()?.passes.get(token).cloned())
    }

    async fn delete_pass(&self, token: &str) -> CoreResult<bool> {
        Ok(self.write()?.passes.remove(token).is_some())
    }

    async fn list_passes(&self, condominio_id: &str) -> CoreResult<Vec<GuestPass>> {
        let t = self.read()?;
        let mut passes: Vec<GuestPass> = t
            .passes
            .values()
            .filter(|p| p.condominio_id == condominio_id)
            .cloned()
            .collect();
        passes.sort_by_key(|p| p.issued_at);
        Ok(passes)
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn append_registration(&self, registration: &GateRegistration) -> CoreResult<()> {
        self.write()?.registrations.push(registration.clone());
        Ok(())
    }

    async fn list_registrations(&self, condominio_id: &str) -> CoreResult<Vec<GateRegistration>> {
        Ok(self
            .read()?
            .registrations
            .iter()
            .filter(|r| r.condominio_id == condominio_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn raise_alert(&self, alert: &PanicAlert) -> CoreResult<Option<String>> {
        let mut t = self.write()?;
        t.alerts.insert(alert.id.clone(), alert.clone());
        Ok(t.active.insert(
            (alert.guard_id.clone(), alert.condominio_id.clone()),
            alert.id.clone(),
        ))
    }

    async fn get_alert(&self, alert_id: &str) -> CoreResult<Option<PanicAlert>> {
        Ok(self.read()?.alerts.get(alert_id).cloned())
    }

    async fn mark_cleared(
        &self,
        alert_id: &str,
        cleared_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<(PanicAlert, bool)>> {
        let mut t = self.write()?;
        let Some(alert) = t.alerts.get_mut(alert_id) else {
            return Ok(None);
        };
        if alert.cleared {
            return Ok(Some((alert.clone(), false)));
        }
        alert.cleared = true;
        alert.cleared_at = Some(at);
        alert.cleared_by = cleared_by.map(str::to_string);
        Ok(Some((alert.clone(), true)))
    }

    async fn list_alerts(&self, condominio_id: &str) -> CoreResult<Vec<PanicAlert>> {
        let t = self.read()?;
        let mut alerts: Vec<PanicAlert> = t
            .alerts
            .values()
            .filter(|a| a.condominio_id == condominio_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.raised_at.cmp(&b.raised_at).then_with(|| a.id.cmp(&b.id)));
        Ok(alerts)
    }

    async fn release_active(
        &self,
        guard_id: &str,
        condominio_id: &str,
        alert_id: &str,
    ) -> CoreResult<bool> {
        let mut t = self.write()?;
        let key = (guard_id.to_string(), condominio_id.to_string());
        if t.active.get(&key).map(String::as_str) == Some(alert_id) {
            t.active.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn active_ids(&self, condominio_id: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .read()?
            .active
            .iter()
            .filter(|((_, condo), _)| condo == condominio_id)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

#[async_trait]
impl BitacoraStore for InMemoryStore {
    async fn insert_entry(&self, entry: &BitacoraEntry) -> CoreResult<()> {
        self.write()?.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> CoreResult<Option<BitacoraEntry>> {
        Ok(self.read()?.entries.get(entry_id).cloned())
    }

    async fn attach_petition(&self, entry_id: &str, petition_id: &str) -> CoreResult<BitacoraEntry> {
        let mut t = self.write()?;
        let entry = t
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| CoreError::not_found("bitacora entry", entry_id))?;
        if let Some(existing) = &entry.petition_id {
            return Err(CoreError::AlreadyEscalated {
                entry_id: entry_id.to_string(),
                petition_id: existing.clone(),
            });
        }
        entry.petition_id = Some(petition_id.to_string());
        Ok(entry.clone())
    }

    async fn list_entries(&self, condominio_id: &str) -> CoreResult<Vec<BitacoraEntry>> {
        let t = self.read()?;
        let mut entries: Vec<BitacoraEntry> = t
            .entries
            .values()
            .filter(|e| e.condominio_id == condominio_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}

#[async_trait]
impl PetitionStore for InMemoryStore {
    async fn create_petition(&self, draft: &PetitionDraft) -> CoreResult<String> {
        let petition = Petition {
            id: new_id(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            condominio_id: draft.condominio_id.clone(),
            source_entry_id: draft.source_entry_id.clone(),
            created_at: Utc::now(),
        };
        let id = petition.id.clone();
        self.write()?.petitions.insert(id.clone(), petition);
        Ok(id)
    }

    async fn get_petition(&self, petition_id: &str) -> CoreResult<Option<Petition>> {
        Ok(self.read()?.petitions.get(petition_id).cloned())
    }

    async fn find_petition_by_source(&self, entry_id: &str) -> CoreResult<Option<Petition>> {
        Ok(self
            .read()?
            .petitions
            .values()
            .filter(|p| p.source_entry_id == entry_id)
            .min_by_key(|p| p.created_at)
            .cloned())
    }
}

impl Store for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert(id: &str, guard: &str, offset_secs: i64) -> PanicAlert {
        PanicAlert {
            id: id.to_string(),
            guard_id: guard.to_string(),
            condominio_id: "c1".to_string(),
            raised_at: Utc::now() + Duration::seconds(offset_secs),
            cleared: false,
            cleared_at: None,
            cleared_by: None,
        }
    }

    #[tokio::test]
    async fn test_release_active_is_compare_and_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.raise_alert(&alert("a1", "g1", 0)).await.unwrap(), None);
        let prev = store.raise_alert(&alert("a2", "g1", 1)).await.unwrap();
        assert_eq!(prev.as_deref(), Some("a1"));
        assert_eq!(store.list_alerts("c1").await.unwrap().len(), 2);

        // Stale id does not release the newer pointer
        assert!(!store.release_active("g1", "c1", "a1").await.unwrap());
        assert_eq!(store.active_ids("c1").await.unwrap(), vec!["a2".to_string()]);

        assert!(store.release_active("g1", "c1", "a2").await.unwrap());
        assert!(store.active_ids("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_cleared_reports_first_transition_only() {
        let store = InMemoryStore::new();
        store.raise_alert(&alert("a1", "g1", 0)).await.unwrap();

        let (first, changed) = store.mark_cleared("a1", Some("admin"), Utc::now()).await.unwrap().unwrap();
        assert!(changed);
        assert!(first.cleared);
        assert_eq!(first.cleared_by.as_deref(), Some("admin"));

        let (_, changed_again) = store.mark_cleared("a1", None, Utc::now()).await.unwrap().unwrap();
        assert!(!changed_again);

        assert!(store.mark_cleared("missing", None, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alerts_listed_oldest_first() {
        let store = InMemoryStore::new();
        store.raise_alert(&alert("late", "g1", 30)).await.unwrap();
        store.raise_alert(&alert("early", "g2", -30)).await.unwrap();
        let ids: Vec<String> = store.list_alerts("c1").await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
    }
}
