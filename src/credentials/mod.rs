//! Credential Registry
//!
//! Owns guest-pass records: issues tokens, resolves them for the gate, and
//! revokes them. Passes are immutable once issued; expiry is never stored as
//! a flag but derived on demand by [`is_valid`], which is the single place
//! expiry semantics live.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{bounded, CoreError, CoreResult};
use crate::storage::PassStore;
use crate::types::{AccessType, GuestPass, GuestPassSpec, Validity};

/// Longest normalized plate accepted, in characters. Content is not checked.
pub const MAX_PLATE_CHARS: usize = 32;

/// Whether `pass` admits an entry at `at`.
///
/// The window is half-open, `[issued_at, expires_at)`: a bounded pass whose
/// expiry equals `at` is already expired. Permanent passes are valid from
/// issuance onward.
pub fn is_valid(pass: &GuestPass, at: DateTime<Utc>) -> bool {
    if at < pass.issued_at {
        return false;
    }
    match pass.validity {
        Validity::Permanent => true,
        Validity::Bounded { expires_at } => at < expires_at,
    }
}

pub struct CredentialRegistry {
    store: Arc<dyn PassStore>,
    store_timeout: Duration,
}

impl CredentialRegistry {
    pub fn new(store: Arc<dyn PassStore>, store_timeout: Duration) -> Self {
        Self { store, store_timeout }
    }

    /// Validate `spec` and persist a new pass with a freshly generated token.
    pub async fn issue(&self, spec: GuestPassSpec) -> CoreResult<GuestPass> {
        let pass = Self::build_pass(spec, Utc::now())?;
        bounded("pass.insert", self.store_timeout, self.store.insert_pass(&pass)).await?;

        info!(
            token = %pass.token,
            condominio = %pass.condominio_id,
            access_type = %pass.access_type,
            expires_at = ?pass.validity.expires_at(),
            "Guest pass issued"
        );
        Ok(pass)
    }

    /// Delete a pass. A second revoke of the same token fails with `NotFound`,
    /// which callers should read as "already gone".
    pub async fn revoke(&self, token: &str) -> CoreResult<()> {
        let deleted = bounded("pass.delete", self.store_timeout, self.store.delete_pass(token)).await?;
        if !deleted {
            debug!(token, "Revoke of unknown or already revoked pass");
            return Err(CoreError::not_found("guest pass", token));
        }
        info!(token, "Guest pass revoked");
        Ok(())
    }

    /// Pure lookup. `Ok(None)` means the token is unknown or revoked.
    pub async fn resolve(&self, token: &str) -> CoreResult<Option<GuestPass>> {
        bounded("pass.get", self.store_timeout, self.store.get_pass(token)).await
    }

    /// Passes issued for a condominium, oldest first, expired ones included.
    pub async fn list_by_condominio(&self, condominio_id: &str) -> CoreResult<Vec<GuestPass>> {
        bounded("pass.list", self.store_timeout, self.store.list_passes(condominio_id)).await
    }

    fn build_pass(spec: GuestPassSpec, now: DateTime<Utc>) -> CoreResult<GuestPass> {
        let guest_name = spec.guest_name.trim().to_string();
        if guest_name.is_empty() {
            return Err(CoreError::Validation("guest_name must not be empty".to_string()));
        }
        if spec.condominio_id.trim().is_empty() || spec.residence_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "condominio_id and residence_id are required".to_string(),
            ));
        }

        if let Validity::Bounded { expires_at } = spec.validity {
            if expires_at <= now {
                return Err(CoreError::Validation(format!(
                    "expiry {expires_at} must be after issuance time {now}"
                )));
            }
        }

        let license_plate = match spec.access_type {
            AccessType::Vehicular => {
                let plate = spec
                    .license_plate
                    .as_deref()
                    .map(normalize_plate)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        CoreError::Validation("vehicular passes require a license plate".to_string())
                    })?;
                if plate.chars().count() > MAX_PLATE_CHARS {
                    return Err(CoreError::Validation(format!(
                        "license plate longer than {MAX_PLATE_CHARS} characters"
                    )));
                }
                Some(plate)
            }
            AccessType::Pedestrian => {
                if spec.license_plate.as_deref().is_some_and(|p| !p.trim().is_empty()) {
                    return Err(CoreError::Validation(
                        "pedestrian passes must not carry a license plate".to_string(),
                    ));
                }
                None
            }
        };

        Ok(GuestPass {
            token: uuid::Uuid::new_v4().to_string(),
            guest_name,
            access_type: spec.access_type,
            license_plate,
            category: spec.category,
            validity: spec.validity,
            issued_at: now,
            condominio_id: spec.condominio_id,
            residence_id: spec.residence_id,
        })
    }
}

/// Uppercase and collapse inner whitespace: `" abc  123 "` -> `"ABC 123"`.
pub fn normalize_plate(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
