//! Process-wide budget ceilings.
//!
//! These bounds are part of the external contract: rubric thresholds are
//! tuned against them, so they clamp rather than configure.

use serde::{Deserialize, Serialize};

/// Maximum concurrent worker lanes in a fanout.
pub const MAX_CONCURRENCY: usize = 10;
/// Maximum namespaces a single orchestration may touch.
pub const MAX_NAMESPACE_LIMIT: usize = 500;
/// Smallest usable time budget.
pub const MIN_TIME_BUDGET_MS: u64 = 1000;
/// Inclusive range for a triage step budget.
pub const MIN_STEP_BUDGET: usize = 1;
pub const MAX_STEP_BUDGET: usize = 5;

/// Time/scope budget for one orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl Budget {
    /// A copy with every field forced inside the process ceilings.
    pub fn clamped(&self) -> Budget {
        Budget {
            time_ms: self.time_ms.max(MIN_TIME_BUDGET_MS),
            namespace_limit: self.namespace_limit.map(|n| n.clamp(1, MAX_NAMESPACE_LIMIT)),
            concurrency: self.concurrency.map(|n| n.clamp(1, MAX_CONCURRENCY)),
        }
    }
}

/// Clamp a requested step budget into the supported range.
pub fn clamp_step_budget(requested: usize) -> usize {
    requested.clamp(MIN_STEP_BUDGET, MAX_STEP_BUDGET)
}
