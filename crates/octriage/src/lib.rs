//! octriage - triage orchestration and rubric evaluation core.
//!
//! Turns a free-text cluster complaint into a bounded, read-only
//! diagnostic run: intent normalization, template planning, boundary
//! enforcement, concurrent tool fanout, evidence scoring, and a
//! structured envelope with rubric verdicts.

pub mod budget;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod expr;
pub mod intent;
pub mod queue;
pub mod rubric;
pub mod template;
pub mod triage;

pub use budget::Budget;
pub use config::TriageConfig;
pub use enforcement::{BoundaryEnforcer, EnforcerConfig};
pub use error::TriageError;
pub use intent::{normalize_intent, CanonicalIntent};
pub use queue::{OrchestrationQueue, QueueOptions, ToolClient, ToolRequest};
pub use rubric::{evaluate_rubrics, RubricOutcome, RubricRegistry, ScoringRubric};
pub use template::{DiagnosticTemplate, TemplateRegistry};
pub use triage::{TriageEnvelope, TriageHandler, TriageRequest};

/// Install the process-wide tracing subscriber. Filter comes from
/// `RUST_LOG`, defaulting to info.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
