//! Rubric evaluation.
//!
//! Pure, deterministic functions over `(rubric, context)`. The family is
//! intentionally total: missing or malformed inputs degrade to a failing
//! guard, a fallback label, or no label at all, never an error. A scoring
//! system that reports "unknown/blocked" on bad data is safer mid-incident
//! than one that crashes.

use super::{GuardsRubric, MappingRubric, ScoringRubric, WeightedRubric};
use crate::expr::{self, Context};
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};

/// Result of evaluating a weighted rubric.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedOutcome {
    pub id: String,
    pub score: f64,
    pub label: Option<String>,
    /// Band declarations, label and expression text, in evaluation order.
    pub bands: Vec<(String, String)>,
    /// Resolved numeric value per declared input.
    pub inputs: BTreeMap<String, f64>,
    /// Weighted contribution per declared input.
    pub breakdown: BTreeMap<String, f64>,
}

/// Result of evaluating a guards rubric.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardsOutcome {
    pub id: String,
    pub allow_auto: bool,
    pub guards: Vec<String>,
    /// Guards that evaluated false, verbatim, in declaration order.
    pub failing: Vec<String>,
}

/// Result of evaluating a mapping rubric.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOutcome {
    pub id: String,
    pub label: String,
    /// The expression that matched, or `"n/a"` if nothing did.
    pub matched: String,
}

/// Outcome of any rubric kind, tagged like the rubric itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RubricOutcome {
    Weighted(WeightedOutcome),
    Guards(GuardsOutcome),
    Mapping(MappingOutcome),
}

impl RubricOutcome {
    /// The chosen label, if this outcome kind carries one.
    pub fn label(&self) -> Option<&str> {
        match self {
            RubricOutcome::Weighted(o) => o.label.as_deref(),
            RubricOutcome::Mapping(o) => Some(&o.label),
            RubricOutcome::Guards(_) => None,
        }
    }

    /// Whether automatic action is allowed. Only guards rubrics can say yes.
    pub fn allow_auto(&self) -> bool {
        matches!(self, RubricOutcome::Guards(o) if o.allow_auto)
    }
}

fn resolve_numeric(ctx: &Context, key: &str) -> f64 {
    match ctx.get(key) {
        Some(Json::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Json::Bool(true)) => 1.0,
        Some(Json::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Weighted sum over normalized inputs, then first-match band labelling.
/// A missing input contributes 0; if no band matches and no fallback was
/// declared, `label` is `None` (a definition defect, not a crash).
pub fn evaluate_weighted(rubric: &WeightedRubric, ctx: &Context) -> WeightedOutcome {
    let mut inputs = BTreeMap::new();
    let mut breakdown = BTreeMap::new();
    let mut score = 0.0;
    for key in &rubric.inputs {
        let raw = resolve_numeric(ctx, key);
        let value = expr::normalize(raw, rubric.normalize.get(key).map(String::as_str));
        let weight = rubric.weights.get(key).copied().unwrap_or(0.0);
        inputs.insert(key.clone(), raw);
        breakdown.insert(key.clone(), weight * value);
        score += weight * value;
    }
    let label = rubric
        .bands
        .iter()
        .find(|band| band.when.eval_band(score))
        .map(|band| band.label.clone());
    WeightedOutcome {
        id: rubric.id.clone(),
        score,
        label,
        bands: rubric
            .bands
            .iter()
            .map(|b| (b.label.clone(), b.when.raw().to_string()))
            .collect(),
        inputs,
        breakdown,
    }
}

/// Evaluate every guard; automatic action is allowed only when none fail.
/// Missing inputs make a guard fail, so it lands in `failing`.
pub fn evaluate_guards(rubric: &GuardsRubric, ctx: &Context) -> GuardsOutcome {
    let failing: Vec<String> = rubric
        .guards
        .iter()
        .filter(|g| !g.eval_bool(ctx))
        .map(|g| g.raw().to_string())
        .collect();
    GuardsOutcome {
        id: rubric.id.clone(),
        allow_auto: failing.is_empty(),
        guards: rubric.guards.iter().map(|g| g.raw().to_string()).collect(),
        failing,
    }
}

/// Walk the mapping in declaration order and return the first label whose
/// expression holds. A trailing `"otherwise"` guarantees termination; with
/// no match at all the label degrades to `"Unknown"`.
pub fn evaluate_mapping(rubric: &MappingRubric, ctx: &Context) -> MappingOutcome {
    for entry in &rubric.mapping {
        if entry.when.eval_bool(ctx) {
            return MappingOutcome {
                id: rubric.id.clone(),
                label: entry.label.clone(),
                matched: entry.when.raw().to_string(),
            };
        }
    }
    MappingOutcome {
        id: rubric.id.clone(),
        label: "Unknown".to_string(),
        matched: "n/a".to_string(),
    }
}

/// Dispatch each named rubric slot to the evaluator for its kind. Slots
/// simply absent from the input are absent from the output.
pub fn evaluate_rubrics<'a>(
    slots: impl IntoIterator<Item = (&'a str, &'a ScoringRubric)>,
    ctx: &Context,
) -> HashMap<String, RubricOutcome> {
    let mut out = HashMap::new();
    for (slot, rubric) in slots {
        let outcome = match rubric {
            ScoringRubric::Weighted(r) => RubricOutcome::Weighted(evaluate_weighted(r, ctx)),
            ScoringRubric::Guards(r) => RubricOutcome::Guards(evaluate_guards(r, ctx)),
            ScoringRubric::Mapping(r) => RubricOutcome::Mapping(evaluate_mapping(r, ctx)),
        };
        out.insert(slot.to_string(), outcome);
    }
    out
}
