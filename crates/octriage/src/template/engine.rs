//! Plan expansion and evidence scoring.
//!
//! `build_plan` turns a template plus runtime variables into a concrete
//! ordered step list clamped to the requested budget. `evaluate_evidence`
//! checks, after execution, which of the template's declared evidence
//! requirements the collected outputs actually satisfy.

use super::{
    DiagnosticTemplate, EvidenceSelector, ExecutionRecord, JsonMap, PlanBoundaries, PlanResult,
    PlannedStep,
};
use regex::RegexBuilder;
use serde_json::Value as Json;
use std::collections::HashMap;
use tracing::info;

/// Runtime inputs for plan expansion.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub session_id: String,
    pub bounded: bool,
    pub step_budget: Option<usize>,
    pub vars: HashMap<String, Json>,
}

/// Expand a template into a concrete plan: substitute `<var>` tokens,
/// inject the session id into every step, and clamp to the smaller of the
/// requested budget and the template's own ceiling.
///
/// Unmatched variable tokens are left verbatim on purpose: an unresolved
/// `<ns>` downstream signals a template/caller mismatch instead of being
/// silently blanked.
pub fn build_plan(template: &DiagnosticTemplate, ctx: &PlanContext) -> PlanResult {
    let step_count = template.steps.len().max(1);
    let requested = if ctx.bounded {
        ctx.step_budget
            .unwrap_or(template.boundaries.max_steps)
            .min(template.boundaries.max_steps)
            .min(step_count)
            .max(1)
    } else {
        // Unbounded runs still respect the template's own ceiling.
        step_count.min(template.boundaries.max_steps).max(1)
    };

    let steps = template
        .steps
        .iter()
        .take(requested)
        .map(|s| {
            let mut params = JsonMap::new();
            params.insert("sessionId".to_string(), Json::from(ctx.session_id.clone()));
            for (key, value) in &s.params {
                params.insert(key.clone(), replace_vars(value, &ctx.vars));
            }
            PlannedStep {
                tool: s.tool.clone(),
                params,
                rationale: s.rationale.clone(),
            }
        })
        .collect();

    PlanResult {
        plan_id: ctx.session_id.clone(),
        steps,
        boundaries: PlanBoundaries {
            max_steps: requested,
            timeout_ms: template.boundaries.timeout_ms,
        },
    }
}

/// Replace whole-value `<token>` strings with the matching runtime var,
/// recursing through arrays and objects.
fn replace_vars(value: &Json, vars: &HashMap<String, Json>) -> Json {
    match value {
        Json::String(s) => match variable_token(s) {
            Some(name) => vars.get(name).cloned().unwrap_or_else(|| value.clone()),
            None => value.clone(),
        },
        Json::Array(items) => Json::Array(items.iter().map(|v| replace_vars(v, vars)).collect()),
        Json::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_vars(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn variable_token(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('<')?.strip_suffix('>')?;
    if inner.is_empty() || inner.contains('<') || inner.contains('>') {
        return None;
    }
    Some(inner)
}

/// Outcome of evidence evaluation for one executed plan.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceReport {
    /// Fraction of required evidence satisfied, 0..1. An empty contract is
    /// fully satisfied.
    pub completeness: f64,
    pub missing: Vec<String>,
    pub present: Vec<String>,
}

/// Score executed step outputs against the template's evidence contract.
/// A requirement is present when any of its selectors matches any record.
pub fn evaluate_evidence(template: &DiagnosticTemplate, executed: &[ExecutionRecord]) -> EvidenceReport {
    let Some(contract) = &template.evidence_contract else {
        return EvidenceReport {
            completeness: 1.0,
            missing: Vec::new(),
            present: Vec::new(),
        };
    };

    let parsed: Vec<(Option<Json>, String)> = executed.iter().map(|r| interpret(&r.result)).collect();
    let text_all = parsed
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut present = Vec::new();
    let mut missing = Vec::new();
    for requirement in &contract.required {
        let selectors = contract.selectors.get(requirement);
        let satisfied = selectors
            .map(|sels| {
                sels.iter()
                    .any(|sel| selector_matches(sel, &parsed, &text_all))
            })
            .unwrap_or(false);
        if satisfied {
            present.push(requirement.clone());
        } else {
            missing.push(requirement.clone());
        }
    }

    let completeness = if contract.required.is_empty() {
        1.0
    } else {
        present.len() as f64 / contract.required.len() as f64
    };
    info!(
        "Evidence completeness ({}): {:.2}",
        template.triage_target, completeness
    );
    EvidenceReport {
        completeness,
        missing,
        present,
    }
}

/// Split a raw step result into (parsed JSON, textual form). String results
/// are parsed opportunistically; structured results are serialized for the
/// text view.
fn interpret(result: &Json) -> (Option<Json>, String) {
    match result {
        Json::String(s) => (serde_json::from_str(s).ok(), s.clone()),
        other => (
            Some(other.clone()),
            serde_json::to_string(other).unwrap_or_default(),
        ),
    }
}

fn selector_matches(sel: &EvidenceSelector, parsed: &[(Option<Json>, String)], text_all: &str) -> bool {
    match sel {
        EvidenceSelector::EventsRegex { path } => {
            let pattern = path.strip_prefix("(?i)").unwrap_or(path);
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re.is_match(text_all),
                Err(_) => false,
            }
        }
        EvidenceSelector::Jsonpath { path } | EvidenceSelector::Yq { path } => parsed
            .iter()
            .filter_map(|(obj, _)| obj.as_ref())
            .any(|obj| select_json_path(obj, path).is_some_and(|v| non_empty(&v))),
        EvidenceSelector::Dsl { path } => text_all.contains(path.as_str()),
    }
}

fn non_empty(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::String(s) => !s.is_empty(),
        Json::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Minimal dot/bracket path traversal: `{.spec.taints[*].key}` or
/// `.status.phase`. Arrays are flattened per segment; a single survivor is
/// unwrapped.
fn select_json_path(obj: &Json, path: &str) -> Option<Json> {
    let dot = path
        .trim()
        .strip_prefix("{.")
        .and_then(|p| p.strip_suffix('}'))
        .unwrap_or_else(|| path.trim().trim_start_matches('.'));

    let segments: Vec<String> = dot
        .split('.')
        .filter(|s| !s.is_empty())
        .map(clean_segment)
        .collect();

    let mut current = obj.clone();
    for seg in &segments {
        current = match current {
            Json::Array(items) => {
                let picked: Vec<Json> = items
                    .iter()
                    .filter_map(|item| item.get(seg).cloned())
                    .collect();
                if picked.len() == 1 {
                    picked.into_iter().next().unwrap_or(Json::Null)
                } else {
                    Json::Array(picked)
                }
            }
            Json::Object(map) => map.get(seg)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

/// Strip bracket suffixes (`[*]`, `[0]`, `[]`) and a trailing `?` from a
/// path segment, leaving the bare key name.
fn clean_segment(seg: &str) -> String {
    let mut s = seg.trim_end_matches('?').to_string();
    while let (Some(open), Some(close)) = (s.find('['), s.find(']')) {
        if close <= open {
            break;
        }
        s.replace_range(open..=close, "");
    }
    s
}
