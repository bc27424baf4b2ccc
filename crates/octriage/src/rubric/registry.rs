//! Rubric registry - holds named rubric definitions by id.

use super::ScoringRubric;
use std::collections::HashMap;
use tracing::debug;

/// Registry of scoring rubrics. Ids are globally unique; re-registering an
/// id overwrites silently (last write wins).
pub struct RubricRegistry {
    by_id: HashMap<String, ScoringRubric>,
}

impl RubricRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
        }
    }

    /// Register a rubric, replacing any previous definition with the same id
    pub fn register(&mut self, rubric: ScoringRubric) {
        debug!("Registering rubric: {}", rubric.id());
        self.by_id.insert(rubric.id().to_string(), rubric);
    }

    /// Get rubric by id
    pub fn get_by_id(&self, id: &str) -> Option<&ScoringRubric> {
        self.by_id.get(id)
    }

    /// List all registered rubrics
    pub fn list(&self) -> Vec<&ScoringRubric> {
        self.by_id.values().collect()
    }

    /// Count registered rubrics
    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}

impl Default for RubricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
