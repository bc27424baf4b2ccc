//! Diagnostic templates.
//!
//! A template is a bounded, parameterized plan of read-only cluster queries
//! plus a contract naming the evidence a successful run should surface.

mod builtin;
mod engine;
mod registry;

pub use builtin::builtin_templates;
pub use engine::{build_plan, evaluate_evidence, EvidenceReport, PlanContext};
pub use registry::{TemplateRegistry, TemplateSelection};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

pub type JsonMap = serde_json::Map<String, Json>;

/// One parameterized step inside a template. Param values may carry
/// angle-bracket variable tokens like `<ns>` resolved at plan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
    pub tool: String,
    #[serde(default)]
    pub params: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// How one evidence requirement is looked for in step output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EvidenceSelector {
    /// Case-insensitive regex over the concatenated textual output.
    EventsRegex { path: String },
    /// Dot/bracket path over parsed JSON output; present means non-empty.
    Jsonpath { path: String },
    /// Legacy alias for the jsonpath traversal.
    Yq { path: String },
    /// Case-sensitive substring anywhere in the output.
    Dsl { path: String },
}

/// Declared evidence requirements and how to detect each one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceContract {
    #[serde(default)]
    pub version: String,
    pub required: Vec<String>,
    #[serde(default)]
    pub selectors: HashMap<String, Vec<EvidenceSelector>>,
    #[serde(default)]
    pub completeness_threshold: f64,
}

/// Hard execution ceilings attached to a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBoundaries {
    pub max_steps: usize,
    pub timeout_ms: u64,
}

/// A diagnostic template: bounded plan skeleton plus evidence contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticTemplate {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    pub triage_target: String,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_contract: Option<EvidenceContract>,
    pub boundaries: ExecutionBoundaries,
}

/// A fully resolved step, ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub tool: String,
    pub params: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Boundaries carried alongside a built plan. `timeout_ms` is advisory
/// metadata for the executing caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanBoundaries {
    pub max_steps: usize,
    pub timeout_ms: u64,
}

/// The concrete ordered plan produced from a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub plan_id: String,
    pub steps: Vec<PlannedStep>,
    pub boundaries: PlanBoundaries,
}

/// A planned step paired with its raw execution output, the unit consumed
/// by evidence evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub step: PlannedStep,
    pub result: Json,
    #[serde(default)]
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_tags_round_trip() {
        let raw = json!([
            { "type": "eventsRegex", "path": "warning|error" },
            { "type": "jsonpath", "path": "{.status.phase}" },
            { "type": "yq", "path": ".spec.storageClassName" },
            { "type": "dsl", "path": "Pending" }
        ]);
        let selectors: Vec<EvidenceSelector> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(selectors.len(), 4);
        assert_eq!(serde_json::to_value(&selectors).unwrap(), raw);
    }

    #[test]
    fn template_decodes_with_defaults() {
        let t: DiagnosticTemplate = serde_json::from_value(json!({
            "id": "demo.v1",
            "triageTarget": "demo",
            "boundaries": { "maxSteps": 3, "timeoutMs": 5000 }
        }))
        .unwrap();
        assert!(t.steps.is_empty());
        assert!(t.evidence_contract.is_none());
        assert_eq!(t.boundaries.max_steps, 3);
    }
}
