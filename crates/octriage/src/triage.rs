//! The triage entry point.
//!
//! Takes a loosely-typed request, normalizes the intent, builds and
//! enforces a bounded plan, executes it through the tool client, scores
//! the evidence with the core rubrics, and wraps everything in a
//! structured envelope.

use crate::budget::clamp_step_budget;
use crate::config::TriageConfig;
use crate::enforcement::{BoundaryEnforcer, CircuitConfig, EnforcerConfig};
use crate::error::TriageError;
use crate::expr::Context;
use crate::intent::normalize_intent;
use crate::queue::ToolClient;
use crate::rubric::{
    evaluate_rubrics, load_core_rubrics, RubricRegistry, EVIDENCE_CONFIDENCE_ID,
    REMEDIATION_SAFETY_ID, TRIAGE_PRIORITY_ID,
};
use crate::template::{
    build_plan, evaluate_evidence, ExecutionRecord, JsonMap, PlanContext, TemplateRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Incoming triage arguments. Callers are chat frontends and scripts, so
/// booleans and numbers may arrive as strings; coercion happens here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriageRequest {
    pub prompt: Option<String>,
    pub intent: Option<String>,
    pub issue: Option<String>,
    pub namespace: Option<String>,
    pub bounded: Option<Json>,
    pub step_budget: Option<Json>,
    pub session_id: Option<String>,
    pub vars: HashMap<String, Json>,
}

impl TriageRequest {
    /// The free-text intent: `intent` wins over `issue` wins over `prompt`.
    fn raw_intent(&self) -> String {
        self.intent
            .as_deref()
            .or(self.issue.as_deref())
            .or(self.prompt.as_deref())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

fn coerce_bool(value: &Json, default: bool) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Json::Null => default,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        _ => default,
    }
}

fn coerce_step_budget(value: &Json, default: usize) -> usize {
    let n = match value {
        Json::Number(n) => n.as_u64().map(|v| v as usize),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    clamp_step_budget(n.unwrap_or(default))
}

/// Automatic-action verdict for the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SafetyVerdict {
    #[serde(rename = "ALLOW")]
    Allow,
    #[serde(rename = "REQUIRES_APPROVAL")]
    RequiresApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

fn map_priority(label: Option<&str>) -> Priority {
    match label.map(str::to_uppercase).as_deref() {
        Some("CRITICAL") => Priority::P1,
        Some("HIGH") => Priority::P2,
        Some("MEDIUM") => Priority::P3,
        _ => Priority::P4,
    }
}

fn map_confidence(label: Option<&str>) -> Confidence {
    match label.map(str::to_uppercase).as_deref() {
        Some("HIGH") => Confidence::High,
        Some("MEDIUM") => Confidence::Medium,
        _ => Confidence::Low,
    }
}

/// How the request was routed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageRouting {
    pub intent: String,
    pub template_id: String,
    pub bounded: bool,
    pub step_budget: usize,
}

/// Rubric verdicts, mapped to their external vocabulary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageRubrics {
    pub safety: SafetyVerdict,
    pub priority: Priority,
    pub confidence: Confidence,
}

/// Evidence completeness against the template contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageEvidence {
    pub completeness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_threshold: Option<f64>,
    pub missing: Vec<String>,
    pub present: Vec<String>,
}

/// A safety-classified follow-up the operator could run by hand.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAction {
    pub command: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub safety: String,
    pub description: String,
}

/// A tool call the run actually made, for replay and audit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpTool {
    pub tool: String,
    pub params: JsonMap,
    pub duration_ms: u64,
}

/// The structured triage result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageEnvelope {
    pub routing: TriageRouting,
    pub rubrics: TriageRubrics,
    pub summary: String,
    pub evidence: TriageEvidence,
    pub next_actions: Vec<NextAction>,
    pub prompt_suggestions: Vec<String>,
    pub follow_up_tools: Vec<FollowUpTool>,
}

impl TriageEnvelope {
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Owns the registries and the boundary enforcer, and runs requests
/// end to end. One handler per process; the enforcer's circuit window is
/// shared state on purpose.
pub struct TriageHandler {
    templates: TemplateRegistry,
    rubrics: RubricRegistry,
    enforcer: Mutex<BoundaryEnforcer>,
    config: TriageConfig,
}

impl TriageHandler {
    pub fn new(config: TriageConfig) -> Self {
        let mut templates = TemplateRegistry::with_builtins();
        if let Some(dir) = &config.templates_dir {
            match templates.load_from_dir(dir) {
                Ok(n) => info!("Loaded {} extra templates from {}", n, dir),
                Err(e) => warn!("Extra template load failed: {}", e),
            }
        }
        let mut rubrics = RubricRegistry::new();
        load_core_rubrics(&mut rubrics);

        let allowed = if config.allowed_namespaces.is_empty() {
            None
        } else {
            Some(config.allowed_namespaces.clone())
        };
        let enforcer = BoundaryEnforcer::new(EnforcerConfig {
            // Per-plan ceilings are re-applied from the template at run
            // time; this is the outer cap.
            max_steps: crate::budget::MAX_STEP_BUDGET,
            timeout_ms: 0,
            allowed_namespaces: allowed,
            tool_whitelist: None,
            circuit: Some(CircuitConfig {
                window_ms: config.circuit.window_ms,
                max_repeat_calls_per_tool: config.circuit.max_repeat_calls_per_tool,
            }),
        });

        Self {
            templates,
            rubrics,
            enforcer: Mutex::new(enforcer),
            config,
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Run one triage request to a finished envelope.
    pub async fn run(
        &self,
        client: &dyn ToolClient,
        req: &TriageRequest,
    ) -> Result<TriageEnvelope, TriageError> {
        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| format!("triage-{}", Uuid::new_v4()));
        let bounded = req
            .bounded
            .as_ref()
            .map(|v| coerce_bool(v, self.config.bounded))
            .unwrap_or(self.config.bounded);
        let step_budget = req
            .step_budget
            .as_ref()
            .map(|v| coerce_step_budget(v, self.config.default_step_budget))
            .unwrap_or_else(|| clamp_step_budget(self.config.default_step_budget));

        let raw = req.raw_intent();
        let intent =
            normalize_intent(&raw).ok_or_else(|| TriageError::UnknownIntent(raw.clone()))?;
        let target = intent.template_target();
        let selection =
            self.templates
                .select_by_target(target)
                .ok_or_else(|| TriageError::NoTemplate {
                    intent: intent.as_str().to_string(),
                    target: target.to_string(),
                })?;
        let template = selection.template;
        info!(
            "Triage {}: intent {} via {} ({})",
            session_id, intent, template.id, selection.reason
        );

        let mut vars = req.vars.clone();
        if let Some(ns) = &req.namespace {
            vars.insert("namespace".to_string(), json!(ns));
            vars.insert("ns".to_string(), json!(ns));
        }
        // The full expansion covers every template step; budget-dropped
        // and boundary-dropped steps are reported as next actions below.
        let full_plan = build_plan(
            template,
            &PlanContext {
                session_id: session_id.clone(),
                bounded: false,
                step_budget: None,
                vars: vars.clone(),
            },
        );
        let plan = build_plan(
            template,
            &PlanContext {
                session_id: session_id.clone(),
                bounded,
                step_budget: Some(step_budget),
                vars,
            },
        );

        let admitted = match self.enforcer.lock() {
            Ok(mut enforcer) => enforcer.filter_steps(&plan.steps),
            Err(_) => plan.steps.clone(),
        };
        let steps: Vec<_> = admitted.into_iter().take(step_budget).collect();

        let mut executed: Vec<ExecutionRecord> = Vec::with_capacity(steps.len());
        for step in steps {
            let start = Instant::now();
            let result = match client
                .call(&step.tool, Json::Object(step.params.clone()))
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!("Triage {}: step {} failed: {}", session_id, step.tool, e);
                    json!({ "error": e.to_string() })
                }
            };
            executed.push(ExecutionRecord {
                step,
                result,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let report = evaluate_evidence(template, &executed);
        let threshold = template
            .evidence_contract
            .as_ref()
            .map(|c| c.completeness_threshold);
        let evidence = TriageEvidence {
            completeness: report.completeness,
            min_threshold: threshold,
            missing: report.missing.clone(),
            present: report.present,
        };

        let mut ctx = Context::new();
        ctx.insert(
            "evidenceCompleteness".to_string(),
            json!(report.completeness),
        );
        let slots = [
            ("triage", TRIAGE_PRIORITY_ID),
            ("confidence", EVIDENCE_CONFIDENCE_ID),
            ("safety", REMEDIATION_SAFETY_ID),
        ]
        .into_iter()
        .filter_map(|(slot, id)| self.rubrics.get_by_id(id).map(|r| (slot, r)));
        let outcomes = evaluate_rubrics(slots, &ctx);

        let rubrics = TriageRubrics {
            safety: if outcomes.get("safety").is_some_and(|o| o.allow_auto()) {
                SafetyVerdict::Allow
            } else {
                SafetyVerdict::RequiresApproval
            },
            priority: map_priority(outcomes.get("triage").and_then(|o| o.label())),
            confidence: map_confidence(outcomes.get("confidence").and_then(|o| o.label())),
        };

        let mut next_actions = Vec::new();
        let mut prompt_suggestions = Vec::new();
        for item in &report.missing {
            prompt_suggestions.push(format!(
                "Evidence '{}' was not captured; re-run with a namespace or resource name, or raise the step budget.",
                item
            ));
        }
        // Executed steps are an in-order subsequence of the full plan, so a
        // single forward scan finds everything that was planned but never
        // ran (budget truncation or boundary drops).
        let mut ran = executed.iter().peekable();
        for step in &full_plan.steps {
            let matches = ran
                .peek()
                .is_some_and(|r| r.step.tool == step.tool && r.step.params == step.params);
            if matches {
                ran.next();
                continue;
            }
            next_actions.push(NextAction {
                command: format!(
                    "{} {}",
                    step.tool,
                    serde_json::to_string(&step.params).unwrap_or_default()
                ),
                kind: "read-only".to_string(),
                safety: "SAFE".to_string(),
                description: step
                    .rationale
                    .clone()
                    .unwrap_or_else(|| "Remaining planned step".to_string()),
            });
        }

        let summary = format!(
            "Triage {}: priority {:?}, confidence {:?}, evidence completeness {:.2}.",
            intent, rubrics.priority, rubrics.confidence, report.completeness
        );

        Ok(TriageEnvelope {
            routing: TriageRouting {
                intent: intent.as_str().to_string(),
                template_id: template.id.clone(),
                bounded,
                step_budget,
            },
            rubrics,
            summary,
            evidence,
            next_actions,
            prompt_suggestions,
            follow_up_tools: executed
                .into_iter()
                .map(|r| FollowUpTool {
                    tool: r.step.tool,
                    params: r.step.params,
                    duration_ms: r.duration_ms,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_coercion_accepts_string_forms() {
        for truthy in ["true", "1", "yes", "on"] {
            assert!(coerce_bool(&json!(truthy), false));
        }
        assert!(!coerce_bool(&json!("false"), true));
        assert!(!coerce_bool(&json!("off"), true));
        assert!(coerce_bool(&json!(true), false));
        assert!(coerce_bool(&Json::Null, true));
    }

    #[test]
    fn step_budget_coercion_clamps() {
        assert_eq!(coerce_step_budget(&json!(2), 3), 2);
        assert_eq!(coerce_step_budget(&json!("4"), 3), 4);
        assert_eq!(coerce_step_budget(&json!(99), 3), 5);
        assert_eq!(coerce_step_budget(&json!("zero"), 3), 3);
        assert_eq!(coerce_step_budget(&json!(0), 3), 1);
    }

    #[test]
    fn priority_and_confidence_mapping() {
        assert_eq!(map_priority(Some("CRITICAL")), Priority::P1);
        assert_eq!(map_priority(Some("high")), Priority::P2);
        assert_eq!(map_priority(Some("MEDIUM")), Priority::P3);
        assert_eq!(map_priority(Some("LOW")), Priority::P4);
        assert_eq!(map_priority(None), Priority::P4);

        assert_eq!(map_confidence(Some("High")), Confidence::High);
        assert_eq!(map_confidence(Some("medium")), Confidence::Medium);
        assert_eq!(map_confidence(None), Confidence::Low);
    }

    #[test]
    fn raw_intent_precedence() {
        let req = TriageRequest {
            prompt: Some("help".to_string()),
            issue: Some("crashloop".to_string()),
            intent: Some("pvc".to_string()),
            ..Default::default()
        };
        assert_eq!(req.raw_intent(), "pvc");

        let req = TriageRequest {
            prompt: Some("  ingress stuck  ".to_string()),
            ..Default::default()
        };
        assert_eq!(req.raw_intent(), "ingress stuck");
    }

    #[test]
    fn request_decodes_from_loose_json() {
        let req: TriageRequest = serde_json::from_value(json!({
            "intent": "pvc",
            "namespace": "prod-a",
            "bounded": "yes",
            "stepBudget": "2",
            "vars": { "pvc": "data-0" }
        }))
        .unwrap();
        assert_eq!(req.namespace.as_deref(), Some("prod-a"));
        assert!(coerce_bool(req.bounded.as_ref().unwrap(), false));
        assert_eq!(coerce_step_budget(req.step_budget.as_ref().unwrap(), 3), 2);
    }

    #[test]
    fn safety_verdict_serializes_upper_snake() {
        assert_eq!(
            serde_json::to_value(SafetyVerdict::RequiresApproval).unwrap(),
            json!("REQUIRES_APPROVAL")
        );
        assert_eq!(
            serde_json::to_value(SafetyVerdict::Allow).unwrap(),
            json!("ALLOW")
        );
    }
}
