//! Offline oracle: keyword triage plus canned per-task responses
//!
//! Used by tests and by deployments without a model endpoint
//! (`[oracle] backend = "scripted"`). Report triage matches incident keywords
//! (English and Spanish); every other task answers with the response
//! registered for it, or fails like an unavailable oracle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{BinnacleTriage, ClassificationTask, Oracle, OracleRequest};
use crate::error::{CoreError, CoreResult};

struct IncidentRule {
    keywords: &'static [&'static str],
    title: &'static str,
    work: &'static str,
}

const INCIDENT_RULES: &[IncidentRule] = &[
    IncidentRule {
        keywords: &["leak", "flood", "fuga", "inund"],
        title: "Water leak",
        work: "Locate and repair the leak and inspect for water damage.",
    },
    IncidentRule {
        keywords: &["fire", "smoke", "incendio", "humo"],
        title: "Fire hazard",
        work: "Inspect the area and verify extinguishers and alarms.",
    },
    IncidentRule {
        keywords: &["broken", "damaged", "not working", "out of order", "roto", "dañad", "descompuest"],
        title: "Damaged equipment",
        work: "Repair or replace the damaged equipment.",
    },
    IncidentRule {
        keywords: &["light out", "lights out", "lamp", "lámpara", "sin luz", "fundid"],
        title: "Lighting failure",
        work: "Replace the failed lighting.",
    },
    IncidentRule {
        keywords: &["intruder", "break-in", "forced", "intruso", "forzad"],
        title: "Security incident",
        work: "Review the incident with the security provider and reinforce the access point.",
    },
];

#[derive(Default)]
pub struct ScriptedOracle {
    responses: RwLock<HashMap<&'static str, Value>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request for `task` with `response`, overriding triage rules.
    pub fn with_response(self, task: &'static str, response: Value) -> Self {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(task, response);
        }
        self
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn triage(report: &str) -> Value {
        let lower = report.to_lowercase();
        let matched = INCIDENT_RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)));

        match matched {
            Some(rule) => json!({
                "suggested_action": "create_petition",
                "title": rule.title,
                "description": format!("{} Guard report: {}", rule.work, report.trim()),
            }),
            None => json!({
                "suggested_action": "none",
                "title": null,
                "description": null,
            }),
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, request: &OracleRequest) -> CoreResult<Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let canned = self
            .responses
            .read()
            .map_err(|_| CoreError::Classification("scripted oracle lock poisoned".to_string()))?
            .get(request.task)
            .cloned();
        if let Some(response) = canned {
            return Ok(response);
        }

        if request.task == BinnacleTriage::NAME {
            return Ok(Self::triage(request.text.as_deref().unwrap_or_default()));
        }
        Err(CoreError::Classification(format!(
            "no scripted response for task {}",
            request.task
        )))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
