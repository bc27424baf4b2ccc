//! Baseline rubric set.
//!
//! The three core rubrics every triage invocation consults: priority
//! banding, evidence confidence, and remediation safety. Thresholds here
//! are tuned against the process-wide budget ceilings; change them in
//! lockstep or not at all.

use super::{RubricRegistry, ScoringRubric};
use serde_json::json;
use tracing::warn;

/// Id of the baseline priority rubric.
pub const TRIAGE_PRIORITY_ID: &str = "triage-priority.v1";
/// Id of the baseline confidence rubric.
pub const EVIDENCE_CONFIDENCE_ID: &str = "evidence-confidence.v1";
/// Id of the baseline safety rubric.
pub const REMEDIATION_SAFETY_ID: &str = "remediation-safety.v1";

/// Populate a registry with the baseline set. Definitions that fail to
/// decode are skipped with a warning; a registry with zero rubrics still
/// functions, it just produces empty evaluation maps.
pub fn load_core_rubrics(registry: &mut RubricRegistry) {
    for def in [
        triage_priority_v1(),
        evidence_confidence_v1(),
        remediation_safety_v1(),
    ] {
        match serde_json::from_value::<ScoringRubric>(def) {
            Ok(rubric) => registry.register(rubric),
            Err(e) => warn!("Skipping unloadable core rubric: {}", e),
        }
    }
}

fn triage_priority_v1() -> serde_json::Value {
    json!({
        "id": TRIAGE_PRIORITY_ID,
        "kind": "weighted",
        "inputs": ["evidenceCompleteness", "severitySignal", "blastRadius"],
        "weights": {
            "evidenceCompleteness": 0.6,
            "severitySignal": 0.25,
            "blastRadius": 0.15
        },
        "normalize": {
            "blastRadius": "clamp:0..50->0..1"
        },
        "bands": [
            { "label": "CRITICAL", "when": ">=0.85" },
            { "label": "HIGH", "when": ">=0.55" },
            { "label": "MEDIUM", "when": ">=0.3" },
            { "label": "LOW", "when": "otherwise" }
        ]
    })
}

fn evidence_confidence_v1() -> serde_json::Value {
    json!({
        "id": EVIDENCE_CONFIDENCE_ID,
        "kind": "mapping",
        "inputs": ["evidenceCompleteness", "toolAgreement", "freshnessMin"],
        "mapping": [
            { "label": "High",
              "when": "evidenceCompleteness>=0.9 && toolAgreement>=0.8 && freshnessMin<=10" },
            { "label": "Medium", "when": "evidenceCompleteness>=0.75" },
            { "label": "Low", "when": "otherwise" }
        ]
    })
}

fn remediation_safety_v1() -> serde_json::Value {
    json!({
        "id": REMEDIATION_SAFETY_ID,
        "kind": "guards",
        "guards": [
            "scopeValid == true",
            "riskScore <= 0.3",
            "affectedNamespaces <= 3"
        ],
        "decision": { "allowAuto": "all guards true" }
    })
}
