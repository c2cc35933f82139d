//! Error taxonomy shared by every core operation
//!
//! Callers decide on retries with [`CoreError::is_retryable`]. Store and
//! oracle futures are bounded with [`bounded`], which turns an elapsed budget
//! into [`CoreError::Timeout`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input to a core operation. Caller's fault, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity is absent. Sometimes expected (repeated revoke).
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Second clear of the same panic alert.
    #[error("alert {0} is already cleared")]
    AlreadyCleared(String),

    /// Bitácora entry already carries a petition id.
    #[error("entry {entry_id} already escalated to petition {petition_id}")]
    AlreadyEscalated { entry_id: String, petition_id: String },

    /// Oracle unavailable or its output failed schema validation.
    #[error("classification error: {0}")]
    Classification(String),

    /// Oracle output parsed but was internally inconsistent.
    #[error("classification contract violation: {0}")]
    ContractViolation(String),

    /// External call exceeded its budget. No partial write was made.
    #[error("{operation} timed out after {budget_ms} ms")]
    Timeout { operation: &'static str, budget_ms: u64 },

    /// Persistence-layer failure, surfaced as-is.
    #[error("store error: {0}")]
    Store(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound { kind, id: id.into() }
    }

    /// Contract violations are a kind of classification failure.
    pub fn is_classification(&self) -> bool {
        matches!(self, CoreError::Classification(_) | CoreError::ContractViolation(_))
    }

    /// Classification failures and timeouts may be retried; nothing else should be.
    pub fn is_retryable(&self) -> bool {
        self.is_classification() || matches!(self, CoreError::Timeout { .. })
    }
}

impl From<sled::Error> for CoreError {
    fn from(err: sled::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Store(format!("serialization: {err}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Run `fut` under a caller-supplied budget.
pub async fn bounded<T, F>(operation: &'static str, budget: Duration, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(operation, budget_ms, "External call exceeded its budget");
            Err(CoreError::Timeout { operation, budget_ms })
        }
    }
}
