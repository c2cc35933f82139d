//! Alert Channel
//!
//! Panic alerts follow an explicit per-(guard, condominio) state machine,
//! `Idle -> Active -> Idle`, held as a keyed pointer in the store rather than
//! inferred from timestamps. A new `raise` while Active replaces the surfaced
//! alert; the superseded one stays in history.
//!
//! Every committed state change is published as an [`AlertEvent`] on a
//! broadcast channel. Subscribers that lag skip events; writers never wait.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{bounded, CoreError, CoreResult};
use crate::storage::AlertStore;
use crate::types::{new_id, AlertEvent, PanicAlert};

pub struct AlertChannel {
    store: Arc<dyn AlertStore>,
    events: broadcast::Sender<AlertEvent>,
    /// Serializes raise/clear so the active pointer and history never disagree
    transition: Mutex<()>,
    store_timeout: Duration,
}

impl AlertChannel {
    pub fn new(store: Arc<dyn AlertStore>, broadcast_capacity: usize, store_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            store,
            events,
            transition: Mutex::new(()),
            store_timeout,
        }
    }

    /// Raise a new alert for `guard_id`; it becomes the surfaced one.
    pub async fn raise(&self, guard_id: &str, condominio_id: &str) -> CoreResult<PanicAlert> {
        if guard_id.trim().is_empty() || condominio_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "guard_id and condominio_id are required".to_string(),
            ));
        }

        let alert = PanicAlert {
            id: new_id(),
            guard_id: guard_id.to_string(),
            condominio_id: condominio_id.to_string(),
            raised_at: Utc::now(),
            cleared: false,
            cleared_at: None,
            cleared_by: None,
        };

        let previous = {
            let _guard = self.transition.lock().await;
            bounded("alert.raise", self.store_timeout, self.store.raise_alert(&alert)).await?
        };

        warn!(
            alert_id = %alert.id,
            guard_id,
            condominio = condominio_id,
            superseded = ?previous,
            "Panic alert raised"
        );
        self.publish(AlertEvent::Raised(alert.clone()));
        Ok(alert)
    }

    /// Clear `alert_id`, returning the cleared record.
    ///
    /// Not idempotent: a second clear fails with `AlreadyCleared`.
    pub async fn clear(&self, alert_id: &str, cleared_by: Option<&str>) -> CoreResult<PanicAlert> {
        let alert = {
            let _guard = self.transition.lock().await;
            let marked = bounded(
                "alert.mark_cleared",
                self.store_timeout,
                self.store.mark_cleared(alert_id, cleared_by, Utc::now()),
            )
            .await?;

            let alert = match marked {
                None => return Err(CoreError::not_found("panic alert", alert_id)),
                Some((_, false)) => return Err(CoreError::AlreadyCleared(alert_id.to_string())),
                Some((alert, true)) => alert,
            };

            let released = bounded(
                "alert.release_active",
                self.store_timeout,
                self.store.release_active(&alert.guard_id, &alert.condominio_id, &alert.id),
            )
            .await?;
            if !released {
                debug!(alert_id, "Cleared alert was already superseded");
            }
            alert
        };

        info!(
            alert_id = %alert.id,
            guard_id = %alert.guard_id,
            condominio = %alert.condominio_id,
            cleared_by = ?alert.cleared_by,
            "Panic alert cleared"
        );
        self.publish(AlertEvent::Cleared(alert.clone()));
        Ok(alert)
    }

    /// Surfaced alerts of a condominium, one per guard at most, oldest first.
    pub async fn list_active(&self, condominio_id: &str) -> CoreResult<Vec<PanicAlert>> {
        let ids = bounded(
            "alert.active_ids",
            self.store_timeout,
            self.store.active_ids(condominio_id),
        )
        .await?;

        let mut active = Vec::with_capacity(ids.len());
        for id in ids {
            match bounded("alert.get", self.store_timeout, self.store.get_alert(&id)).await? {
                Some(alert) if !alert.cleared => active.push(alert),
                Some(_) => debug!(alert_id = %id, "Active pointer references a cleared alert"),
                None => warn!(alert_id = %id, "Active pointer references a missing alert"),
            }
        }
        active.sort_by(|a, b| a.raised_at.cmp(&b.raised_at).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    /// Every alert raised in a condominium, cleared or not, oldest first.
    pub async fn history(&self, condominio_id: &str) -> CoreResult<Vec<PanicAlert>> {
        bounded("alert.list", self.store_timeout, self.store.list_alerts(condominio_id)).await
    }

    pub async fn get(&self, alert_id: &str) -> CoreResult<PanicAlert> {
        bounded("alert.get", self.store_timeout, self.store.get_alert(alert_id))
            .await?
            .ok_or_else(|| CoreError::not_found("panic alert", alert_id))
    }

    /// Receive every subsequent state change, across all condominiums.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: AlertEvent) {
        // Err only means nobody is listening
        let receivers = self.events.send(event).unwrap_or(0);
        debug!(receivers, "Alert event published");
    }
}
