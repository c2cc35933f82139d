//! Gate Matcher
//!
//! Decides admit/deny for one physical entry attempt and appends exactly one
//! [`GateRegistration`] per attempt, whatever the outcome. The gate records;
//! it does not lock. An attempt without a credential is admitted unverified.
//!
//! Matching order for a presented token:
//! 1. unknown token            -> `Deny(UnknownCredential)`
//! 2. access type differs      -> `Deny(TypeMismatch)` (validity not consulted)
//! 3. not valid at entry time  -> `Deny(Expired)`
//! 4. otherwise                -> `Admit(pass)`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::credentials::{self, normalize_plate, CredentialRegistry};
use crate::error::{bounded, CoreError, CoreResult};
use crate::storage::RegistrationStore;
use crate::types::{
    new_id, Admission, Decision, DenyReason, GateRegistration, RegistrationAttempt,
    VehicleAttributes,
};

pub struct GateMatcher {
    registry: Arc<CredentialRegistry>,
    log: Arc<dyn RegistrationStore>,
    store_timeout: Duration,
}

impl GateMatcher {
    pub fn new(
        registry: Arc<CredentialRegistry>,
        log: Arc<dyn RegistrationStore>,
        store_timeout: Duration,
    ) -> Self {
        Self { registry, log, store_timeout }
    }

    /// Decide on `attempt` and append its audit record.
    ///
    /// A token revoked between resolve and decision is an accepted race: the
    /// outcome reflects whichever the registry saw first.
    pub async fn admit(&self, attempt: RegistrationAttempt) -> CoreResult<Admission> {
        if attempt.condominio_id.trim().is_empty() {
            return Err(CoreError::Validation("condominio_id is required".to_string()));
        }

        let token = attempt
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let decision = match &token {
            None => Decision::AdmitUnverified,
            Some(token) => self.match_token(token, &attempt).await?,
        };

        let registration = GateRegistration {
            id: new_id(),
            access_type: attempt.access_type,
            entered_at: attempt.entered_at,
            condominio_id: attempt.condominio_id,
            residence_id: attempt.residence_id,
            guest_token: token,
            visitor_name: attempt.visitor_name,
            vehicle: attempt.vehicle.map(normalize_vehicle),
            outcome: decision.outcome(),
            recorded_at: Utc::now(),
        };

        bounded(
            "registration.append",
            self.store_timeout,
            self.log.append_registration(&registration),
        )
        .await?;

        match &decision {
            Decision::Deny { reason } => warn!(
                registration = %registration.id,
                condominio = %registration.condominio_id,
                token = ?registration.guest_token,
                %reason,
                "Gate entry denied"
            ),
            _ => info!(
                registration = %registration.id,
                condominio = %registration.condominio_id,
                access_type = %registration.access_type,
                verified = registration.guest_token.is_some(),
                "Gate entry admitted"
            ),
        }

        Ok(Admission { decision, registration })
    }

    async fn match_token(&self, token: &str, attempt: &RegistrationAttempt) -> CoreResult<Decision> {
        let Some(pass) = self.registry.resolve(token).await? else {
            return Ok(Decision::Deny { reason: DenyReason::UnknownCredential });
        };
        if pass.access_type != attempt.access_type {
            return Ok(Decision::Deny { reason: DenyReason::TypeMismatch });
        }
        if !credentials::is_valid(&pass, attempt.entered_at) {
            return Ok(Decision::Deny { reason: DenyReason::Expired });
        }
        Ok(Decision::Admit { pass })
    }

    /// Audit log of a condominium, oldest first.
    pub async fn registrations(&self, condominio_id: &str) -> CoreResult<Vec<GateRegistration>> {
        bounded(
            "registration.list",
            self.store_timeout,
            self.log.list_registrations(condominio_id),
        )
        .await
    }
}

fn normalize_vehicle(v: VehicleAttributes) -> VehicleAttributes {
    VehicleAttributes {
        plate: normalize_plate(&v.plate),
        brand: v.brand.trim().to_string(),
        color: v.color.trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::{AccessType, GateOutcome, GuestPassSpec, Validity, VisitorCategory};
    use chrono::{DateTime, Duration as ChronoDuration};

    struct Fixture {
        registry: Arc<CredentialRegistry>,
        gate: GateMatcher,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(CredentialRegistry::new(store.clone(), Duration::from_secs(1)));
        let gate = GateMatcher::new(registry.clone(), store, Duration::from_secs(1));
        Fixture { registry, gate }
    }

    fn spec(access_type: AccessType, validity: Validity) -> GuestPassSpec {
        GuestPassSpec {
            guest_name: "Ana".to_string(),
            access_type,
            license_plate: (access_type == AccessType::Vehicular).then(|| "ABC123".to_string()),
            category: VisitorCategory::Guest,
            validity,
            condominio_id: "c1".to_string(),
            residence_id: "r1".to_string(),
        }
    }

    fn attempt(access_type: AccessType, token: Option<&str>, at: DateTime<Utc>) -> RegistrationAttempt {
        RegistrationAttempt {
            access_type,
            token: token.map(str::to_string),
            entered_at: at,
            condominio_id: "c1".to_string(),
            residence_id: Some("r1".to_string()),
            visitor_name: Some("Ana".to_string()),
            vehicle: None,
        }
    }

    #[tokio::test]
    async fn test_no_token_admits_unverified() {
        let f = fixture();
        let out = f.gate.admit(attempt(AccessType::Pedestrian, None, Utc::now())).await.unwrap();
        assert_eq!(out.decision, Decision::AdmitUnverified);
        assert_eq!(out.registration.outcome, GateOutcome::AdmittedUnverified);
        assert_eq!(out.registration.guest_token, None);
    }

    #[tokio::test]
    async fn test_blank_token_counts_as_absent() {
        let f = fixture();
        let out = f.gate.admit(attempt(AccessType::Pedestrian, Some("  "), Utc::now())).await.unwrap();
        assert_eq!(out.decision, Decision::AdmitUnverified);
    }

    #[tokio::test]
    async fn test_unknown_token_denied() {
        let f = fixture();
        let out = f
            .gate
            .admit(attempt(AccessType::Vehicular, Some("nope"), Utc::now()))
            .await
            .unwrap();
        assert_eq!(out.decision, Decision::Deny { reason: DenyReason::UnknownCredential });
        assert_eq!(out.registration.guest_token.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_type_mismatch_wins_over_expiry() {
        let f = fixture();
        let pass = f
            .registry
            .issue(spec(
                AccessType::Vehicular,
                Validity::Bounded { expires_at: Utc::now() + ChronoDuration::minutes(10) },
            ))
            .await
            .unwrap();

        // Inside the window and far outside it: mismatch either way
        for at in [Utc::now(), Utc::now() + ChronoDuration::days(2)] {
            let out = f
                .gate
                .admit(attempt(AccessType::Pedestrian, Some(&pass.token), at))
                .await
                .unwrap();
            assert_eq!(out.decision, Decision::Deny { reason: DenyReason::TypeMismatch });
        }
    }

    #[tokio::test]
    async fn test_expiry_boundary_denied() {
        let f = fixture();
        let expires_at = Utc::now() + ChronoDuration::minutes(10);
        let pass = f
            .registry
            .issue(spec(AccessType::Pedestrian, Validity::Bounded { expires_at }))
            .await
            .unwrap();

        let at_expiry = f
            .gate
            .admit(attempt(AccessType::Pedestrian, Some(&pass.token), expires_at))
            .await
            .unwrap();
        assert_eq!(at_expiry.decision, Decision::Deny { reason: DenyReason::Expired });

        let before = f
            .gate
            .admit(attempt(
                AccessType::Pedestrian,
                Some(&pass.token),
                expires_at - ChronoDuration::seconds(1),
            ))
            .await
            .unwrap();
        assert_eq!(before.decision, Decision::Admit { pass: pass.clone() });
        assert_eq!(before.registration.outcome, GateOutcome::Admitted);
    }

    #[tokio::test]
    async fn test_revoked_token_denied_as_unknown() {
        let f = fixture();
        let pass = f.registry.issue(spec(AccessType::Pedestrian, Validity::Permanent)).await.unwrap();
        f.registry.revoke(&pass.token).await.unwrap();

        let out = f
            .gate
            .admit(attempt(AccessType::Pedestrian, Some(&pass.token), Utc::now()))
            .await
            .unwrap();
        assert_eq!(out.decision, Decision::Deny { reason: DenyReason::UnknownCredential });
    }

    #[tokio::test]
    async fn test_every_attempt_recorded_once() {
        let f = fixture();
        let pass = f.registry.issue(spec(AccessType::Pedestrian, Validity::Permanent)).await.unwrap();

        f.gate.admit(attempt(AccessType::Pedestrian, None, Utc::now())).await.unwrap();
        f.gate.admit(attempt(AccessType::Pedestrian, Some("bogus"), Utc::now())).await.unwrap();
        f.gate.admit(attempt(AccessType::Pedestrian, Some(&pass.token), Utc::now())).await.unwrap();
        f.gate.admit(attempt(AccessType::Vehicular, Some(&pass.token), Utc::now())).await.unwrap();

        let log = f.gate.registrations("c1").await.unwrap();
        assert_eq!(log.len(), 4);
        let denied = log
            .iter()
            .filter(|r| matches!(r.outcome, GateOutcome::Denied { .. }))
            .count();
        assert_eq!(denied, 2);
    }

    #[tokio::test]
    async fn test_vehicle_attributes_normalized() {
        let f = fixture();
        let mut a = attempt(AccessType::Vehicular, None, Utc::now());
        a.vehicle = Some(VehicleAttributes {
            plate: " xyz 987 ".to_string(),
            brand: " Nissan ".to_string(),
            color: "Rojo".to_string(),
        });
        let out = f.gate.admit(a).await.unwrap();
        let v = out.registration.vehicle.unwrap();
        assert_eq!(v.plate, "XYZ 987");
        assert_eq!(v.brand, "Nissan");
        assert_eq!(v.color, "rojo");
    }
}
