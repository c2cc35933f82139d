//! Shared data structures for the gate, alert and guard-log subsystems
//!
//! - Credentials: GuestPass, GuestPassSpec, AccessType, Validity
//! - Gate: RegistrationAttempt, Decision, GateRegistration
//! - Alerts: PanicAlert, AlertEvent
//! - Bitácora: BitacoraEntry, EscalationSuggestion, EscalationOutcome, Petition
//! - Classification payloads: payroll rows/audits, vehicle scans, document fields

mod credential;
mod gate;
mod alert;
mod bitacora;
mod classification;

pub use credential::*;
pub use gate::*;
pub use alert::*;
pub use bitacora::*;
pub use classification::*;

/// Fresh random identifier for alerts, registrations, entries and petitions.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
