//! Escalation Classifier
//!
//! One typed call primitive over an external text/image oracle. Each use of
//! the oracle is a [`ClassificationTask`]: it builds the request, names the
//! output schema, and checks the parsed output against its input. The
//! classifier rejects output that fails any of those steps with
//! `CoreError::Classification`; nothing is ever coerced into a default.
//!
//! ## Tasks
//!
//! - [`BinnacleTriage`]: report text -> `create_petition` | `none`
//! - [`PayrollReview`]: payroll rows -> status + anomalies
//! - [`VehicleAttributeScan`]: vehicle photo -> type/brand/color/plate
//! - [`DocumentFieldExtraction`]: document photo -> one text field
//!
//! ## Oracles
//!
//! - [`HttpOracle`]: chat-completions style endpoint with JSON-schema output
//! - [`ScriptedOracle`]: keyword rules and canned responses, no network

mod http;
mod scripted;
mod tasks;

pub use http::HttpOracle;
pub use scripted::ScriptedOracle;
pub use tasks::{BinnacleTriage, DocumentFieldExtraction, PayrollReview, VehicleAttributeScan};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{bounded, CoreError, CoreResult};
use crate::types::{
    DocumentFieldRequest, DocumentFieldValue, EscalationSuggestion, ImageInput, PayrollAudit,
    PayrollRow, VehicleScan,
};

/// A single schema-bound oracle call.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Task name, also used as the schema name
    pub task: &'static str,
    pub instructions: String,
    pub text: Option<String>,
    pub image: Option<ImageInput>,
    /// JSON schema the response must satisfy
    pub schema: Value,
}

/// Capability boundary to whatever turns unstructured input into JSON.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Run one request and return the raw JSON object the oracle produced.
    ///
    /// Transport and provider failures are reported as `Classification`.
    async fn invoke(&self, request: &OracleRequest) -> CoreResult<Value>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Fixed input/output contract of one oracle use.
pub trait ClassificationTask {
    const NAME: &'static str;

    type Input;
    type Output: DeserializeOwned;

    fn output_schema() -> Value;

    /// Validate the input and build the request. Bad input is a `Validation` error.
    fn request(input: &Self::Input) -> CoreResult<OracleRequest>;

    /// Cross-check a parsed output. Inconsistent output is a `ContractViolation`.
    fn validate(_input: &Self::Input, _output: &Self::Output) -> CoreResult<()> {
        Ok(())
    }
}

pub struct EscalationClassifier {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
    max_image_bytes: usize,
}

impl EscalationClassifier {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration, max_image_bytes: usize) -> Self {
        Self { oracle, timeout, max_image_bytes }
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.backend_name()
    }

    /// Generic typed call: build, invoke under the timeout, check the raw
    /// output against the request schema, parse strictly, validate.
    pub async fn classify<T: ClassificationTask>(&self, input: &T::Input) -> CoreResult<T::Output> {
        let request = T::request(input)?;
        if let Some(image) = &request.image {
            self.check_image(image)?;
        }

        let raw = bounded("oracle.invoke", self.timeout, self.oracle.invoke(&request))
            .await
            .inspect_err(|e| {
                warn!(task = T::NAME, oracle = self.oracle.backend_name(), error = %e, "Oracle call failed");
            })?;

        check_schema(T::NAME, &request.schema, &raw)?;

        let output: T::Output = serde_json::from_value(raw).map_err(|e| {
            warn!(task = T::NAME, error = %e, "Oracle output failed schema validation");
            CoreError::Classification(format!("{} output failed schema validation: {e}", T::NAME))
        })?;

        T::validate(input, &output).inspect_err(|e| {
            warn!(task = T::NAME, error = %e, "Oracle output rejected");
        })?;

        debug!(task = T::NAME, oracle = self.oracle.backend_name(), "Classification accepted");
        Ok(output)
    }

    pub async fn triage(&self, report: &str) -> CoreResult<EscalationSuggestion> {
        self.classify::<BinnacleTriage>(&report.to_string()).await
    }

    pub async fn review_payroll(&self, rows: &[PayrollRow]) -> CoreResult<PayrollAudit> {
        self.classify::<PayrollReview>(&rows.to_vec()).await
    }

    pub async fn scan_vehicle(&self, image: &ImageInput) -> CoreResult<VehicleScan> {
        self.classify::<VehicleAttributeScan>(image).await
    }

    pub async fn extract_document_field(
        &self,
        request: &DocumentFieldRequest,
    ) -> CoreResult<DocumentFieldValue> {
        self.classify::<DocumentFieldExtraction>(request).await
    }

    fn check_image(&self, image: &ImageInput) -> CoreResult<()> {
        if image.data.is_empty() {
            return Err(CoreError::Validation("image is empty".to_string()));
        }
        if image.data.len() > self.max_image_bytes {
            return Err(CoreError::Validation(format!(
                "image is {} bytes, limit is {}",
                image.data.len(),
                self.max_image_bytes
            )));
        }
        if !image.is_accepted_mime() {
            return Err(CoreError::Validation(format!(
                "unsupported image type '{}', expected one of {:?}",
                image.mime_type,
                ImageInput::ACCEPTED_MIME_TYPES
            )));
        }
        Ok(())
    }
}

/// Check raw oracle output against the JSON schema the oracle was given.
///
/// A response the provider failed to constrain (missing required keys,
/// wrong types, values outside an enum) is a `Classification` error.
fn check_schema(task: &'static str, schema: &Value, raw: &Value) -> CoreResult<()> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        CoreError::Classification(format!("{task} schema does not compile: {e}"))
    })?;
    validator.validate(raw).map_err(|e| {
        let path = e.instance_path.to_string();
        let path = if path.is_empty() { "$".to_string() } else { format!("${path}") };
        warn!(task, %path, error = %e, "Oracle output failed schema validation");
        CoreError::Classification(format!("{task} output failed schema validation at {path}: {e}"))
    })
}
