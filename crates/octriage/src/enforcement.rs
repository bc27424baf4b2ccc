//! Boundary enforcement for planned steps.
//!
//! Admission control applied between planning and execution: step-count
//! cap, tool whitelist, mutating-verb blocklist, namespace allow-list, and
//! a sliding-window circuit breaker that stops a flapping template or
//! repeated operator retries from hammering the same read endpoint.

use crate::template::PlannedStep;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tool-name segments that indicate a state-changing verb. The core is
/// read-only by contract; anything carrying one of these is dropped.
const MUTATING_VERBS: &[&str] = &[
    "apply", "delete", "scale", "patch", "edit", "replace", "cordon", "drain", "label", "taint",
    "rollout", "create", "annotate",
];

/// Repeat-call circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitConfig {
    pub window_ms: u64,
    pub max_repeat_calls_per_tool: usize,
}

/// Enforcer construction parameters. `timeout_ms` is advisory metadata for
/// the executing caller; the enforcer itself only does step admission.
#[derive(Debug, Clone, Default)]
pub struct EnforcerConfig {
    pub max_steps: usize,
    pub timeout_ms: u64,
    pub allowed_namespaces: Option<Vec<String>>,
    pub tool_whitelist: Option<Vec<String>>,
    pub circuit: Option<CircuitConfig>,
}

struct WindowEntry {
    key: String,
    at: Instant,
}

/// Step admission filter with process-lifetime circuit-breaker state.
/// Construct once and inject; the window intentionally persists across
/// triage calls.
pub struct BoundaryEnforcer {
    cfg: EnforcerConfig,
    recent: Vec<WindowEntry>,
}

impl BoundaryEnforcer {
    pub fn new(cfg: EnforcerConfig) -> Self {
        Self {
            cfg,
            recent: Vec::new(),
        }
    }

    /// Filter a candidate plan down to the steps allowed to run. Order of
    /// survivors is preserved; drops are logged, not reported as errors.
    pub fn filter_steps(&mut self, steps: &[PlannedStep]) -> Vec<PlannedStep> {
        let mut filtered: Vec<PlannedStep> =
            steps.iter().take(self.cfg.max_steps).cloned().collect();
        if steps.len() > filtered.len() {
            debug!(
                "Boundary: truncated plan from {} to {} steps",
                steps.len(),
                filtered.len()
            );
        }

        if let Some(whitelist) = &self.cfg.tool_whitelist {
            if !whitelist.is_empty() {
                filtered.retain(|s| {
                    let ok = whitelist.contains(&s.tool);
                    if !ok {
                        warn!("Boundary: dropping non-whitelisted tool {}", s.tool);
                    }
                    ok
                });
            }
        }

        filtered.retain(|s| {
            let mutating = is_mutating(&s.tool);
            if mutating {
                warn!("Boundary: dropping mutating tool {}", s.tool);
            }
            !mutating
        });

        if let Some(allowed) = &self.cfg.allowed_namespaces {
            if !allowed.is_empty() {
                filtered.retain(|s| {
                    let ns = s.params.get("namespace").and_then(|v| v.as_str());
                    match ns {
                        // Steps without a namespace param pass through.
                        None => true,
                        Some(ns) if ns.is_empty() => true,
                        Some(ns) => {
                            let ok = allowed.iter().any(|a| a == ns);
                            if !ok {
                                warn!("Boundary: dropping step outside namespace scope: {}", ns);
                            }
                            ok
                        }
                    }
                });
            }
        }

        if let Some(circuit) = self.cfg.circuit.clone() {
            let now = Instant::now();
            let window = Duration::from_millis(circuit.window_ms);
            filtered.retain(|s| {
                let key = circuit_key(s);
                let repeats = self
                    .recent
                    .iter()
                    .filter(|e| e.key == key && now.duration_since(e.at) < window)
                    .count();
                if repeats >= circuit.max_repeat_calls_per_tool.max(1) {
                    warn!("Boundary: circuit open for repeated call {}", s.tool);
                    return false;
                }
                self.recent.push(WindowEntry { key, at: now });
                true
            });
            self.recent.retain(|e| now.duration_since(e.at) < window);
        }

        filtered
    }
}

fn circuit_key(step: &PlannedStep) -> String {
    let params = serde_json::to_string(&step.params).unwrap_or_default();
    format!("{}:{}", step.tool, params)
}

fn is_mutating(tool: &str) -> bool {
    tool.to_lowercase()
        .split(['_', '-', '.'])
        .any(|segment| MUTATING_VERBS.contains(&segment))
}
