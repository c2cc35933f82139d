//! HTTP oracle for chat-completions style endpoints
//!
//! Sends the task instructions as the system message, the text and optional
//! image (as a base64 data URL) as the user message, and constrains the reply
//! with `response_format: json_schema`. The assistant message content must be
//! a JSON document; anything else is a classification failure.

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Oracle, OracleRequest};
use crate::config::OracleConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct HttpOracle {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl HttpOracle {
    /// Build from the `[oracle]` config section. The API key is read from the
    /// environment variable named by `api_key_env`; a missing key is allowed
    /// for local endpoints.
    pub fn from_config(config: &OracleConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build oracle HTTP client")?;

        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "No oracle API key set; sending unauthenticated requests");
        }

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn body(&self, request: &OracleRequest) -> Value {
        let mut content = Vec::new();
        if let Some(text) = &request.text {
            content.push(json!({ "type": "text", "text": text }));
        }
        if let Some(image) = &request.image {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{encoded}", image.mime_type) }
            }));
        }

        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": request.instructions },
                { "role": "user", "content": content }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.task,
                    "strict": true,
                    "schema": request.schema
                }
            }
        })
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn invoke(&self, request: &OracleRequest) -> CoreResult<Value> {
        let mut req = self.http.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CoreError::Classification(format!("oracle unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Classification(format!("oracle returned status {status}")));
        }

        let completion: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Classification(format!("malformed oracle response: {e}")))?;

        extract_content(completion)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

fn extract_content(completion: CompletionResponse) -> CoreResult<Value> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| CoreError::Classification("oracle returned no choices".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(CoreError::Classification(format!("oracle refused: {refusal}")));
    }
    let content = message
        .content
        .ok_or_else(|| CoreError::Classification("oracle returned empty content".to_string()))?;

    serde_json::from_str(content.trim())
        .map_err(|e| CoreError::Classification(format!("oracle content is not JSON: {e}")))
}
