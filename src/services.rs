//! Component wiring
//!
//! Builds every core component over one store and one oracle, applying the
//! configured timeouts. The HTTP layer and tests both start from here.

use std::sync::Arc;

use crate::alerts::AlertChannel;
use crate::classifier::{EscalationClassifier, Oracle};
use crate::config::CasetaConfig;
use crate::credentials::CredentialRegistry;
use crate::escalation::BitacoraEscalationPipeline;
use crate::gate::GateMatcher;
use crate::storage::{AlertStore, BitacoraStore, PassStore, PetitionStore, RegistrationStore, Store};

pub struct Services {
    pub credentials: Arc<CredentialRegistry>,
    pub gate: Arc<GateMatcher>,
    pub alerts: Arc<AlertChannel>,
    pub classifier: Arc<EscalationClassifier>,
    pub escalation: Arc<BitacoraEscalationPipeline>,
    pub store_backend: &'static str,
    /// Polling interval advertised to clients that do not use the event stream
    pub poll_interval_secs: u64,
}

impl Services {
    pub fn build<S: Store + 'static>(
        store: Arc<S>,
        oracle: Arc<dyn Oracle>,
        config: &CasetaConfig,
    ) -> Self {
        let store_timeout = config.timeouts.store();

        let passes: Arc<dyn PassStore> = store.clone();
        let registrations: Arc<dyn RegistrationStore> = store.clone();
        let alert_store: Arc<dyn AlertStore> = store.clone();
        let entries: Arc<dyn BitacoraStore> = store.clone();
        let petitions: Arc<dyn PetitionStore> = store.clone();

        let credentials = Arc::new(CredentialRegistry::new(passes, store_timeout));
        let gate = Arc::new(GateMatcher::new(credentials.clone(), registrations, store_timeout));
        let alerts = Arc::new(AlertChannel::new(
            alert_store,
            config.alerts.broadcast_capacity,
            store_timeout,
        ));
        let classifier = Arc::new(EscalationClassifier::new(
            oracle,
            config.oracle.timeout(),
            config.oracle.max_image_bytes,
        ));
        let escalation = Arc::new(BitacoraEscalationPipeline::new(
            classifier.clone(),
            entries,
            petitions,
            store_timeout,
            config.timeouts.petition(),
        ));

        tracing::info!(
            store = store.backend_name(),
            oracle = classifier.oracle_name(),
            store_timeout_ms = config.timeouts.store_ms,
            "Services ready"
        );

        Self {
            credentials,
            gate,
            alerts,
            classifier,
            escalation,
            store_backend: store.backend_name(),
            poll_interval_secs: config.alerts.poll_interval_secs,
        }
    }
}
