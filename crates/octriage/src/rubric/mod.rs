//! Declarative scoring rubrics.
//!
//! A rubric is one of three kinds: a weighted score with labelled bands, a
//! chain of boolean guards gating automatic action, or a conditional label
//! mapping. Bands and mappings are ordered lists, so declaration order is
//! the evaluation order by construction and the `"otherwise"` fallback
//! belongs at the end.

mod core;
mod evaluator;
mod registry;

pub use self::core::{
    load_core_rubrics, EVIDENCE_CONFIDENCE_ID, REMEDIATION_SAFETY_ID, TRIAGE_PRIORITY_ID,
};
pub use evaluator::{
    evaluate_guards, evaluate_mapping, evaluate_rubrics, evaluate_weighted, GuardsOutcome,
    MappingOutcome, RubricOutcome, WeightedOutcome,
};
pub use registry::RubricRegistry;

use crate::expr::CompiledExpr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A labelled predicate inside a band list or a mapping. First matching
/// entry wins; `when: "otherwise"` always matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSpec {
    pub label: String,
    pub when: CompiledExpr,
}

/// Weighted-sum rubric: normalized inputs times weights, summed, then
/// banded into a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedRubric {
    pub id: String,
    pub inputs: Vec<String>,
    pub weights: HashMap<String, f64>,
    /// Per-input normalization specs, e.g. `clamp:0..180->0..1`.
    #[serde(default)]
    pub normalize: HashMap<String, String>,
    pub bands: Vec<BandSpec>,
}

/// Guard-chain rubric: automatic action is allowed only when every guard
/// expression holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardsRubric {
    pub id: String,
    pub guards: Vec<CompiledExpr>,
    pub decision: GuardDecision,
}

/// The decision policy attached to a guards rubric. Currently always the
/// literal "all guards true".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDecision {
    pub allow_auto: String,
}

/// Conditional label mapping evaluated in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRubric {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub mapping: Vec<BandSpec>,
}

/// Any rubric, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScoringRubric {
    Weighted(WeightedRubric),
    Guards(GuardsRubric),
    Mapping(MappingRubric),
}

impl ScoringRubric {
    pub fn id(&self) -> &str {
        match self {
            ScoringRubric::Weighted(r) => &r.id,
            ScoringRubric::Guards(r) => &r.id,
            ScoringRubric::Mapping(r) => &r.id,
        }
    }
}
