//! Triage error types.

use thiserror::Error;

/// Failures a triage request can surface to its caller. Tool-level
/// failures do not appear here; those are folded into step results so the
/// envelope can still report partial evidence.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("unrecognized intent: {0}")]
    UnknownIntent(String),

    #[error("no template registered for intent {intent} (target {target})")]
    NoTemplate { intent: String, target: String },
}
