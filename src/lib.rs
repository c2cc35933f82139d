//! caseta: condominium access control core
//!
//! ## Components
//!
//! - **CredentialRegistry**: guest-pass issuance, lookup, revocation and the
//!   single expiry rule ([`credentials::is_valid`])
//! - **GateMatcher**: admit/deny per entry attempt, one audit record each
//! - **AlertChannel**: guard panic alerts with keyed active state and push
//! - **EscalationClassifier**: schema-bound calls to a text/image oracle
//! - **BitacoraEscalationPipeline**: guard log entries to petitions
//!
//! Storage and the oracle are injected as traits; [`services::Services`]
//! wires everything over one store, and [`api`] exposes it over HTTP.

pub mod alerts;
pub mod api;
pub mod classifier;
pub mod config;
pub mod credentials;
pub mod error;
pub mod escalation;
pub mod gate;
pub mod services;
pub mod storage;
pub mod types;

pub use config::CasetaConfig;
pub use error::{CoreError, CoreResult};

pub use alerts::AlertChannel;
pub use classifier::{EscalationClassifier, HttpOracle, Oracle, ScriptedOracle};
pub use credentials::CredentialRegistry;
pub use escalation::{BitacoraEscalationPipeline, EscalationError};
pub use gate::GateMatcher;
pub use services::Services;
pub use storage::{InMemoryStore, SledStore, Store};
