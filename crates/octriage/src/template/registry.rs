//! Template registry - loads and selects diagnostic templates.

use super::{builtin_templates, DiagnosticTemplate};
use anyhow::{Context as _, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// A selected template plus the reason it won.
#[derive(Debug, Clone)]
pub struct TemplateSelection<'a> {
    pub template: &'a DiagnosticTemplate,
    pub reason: String,
}

/// Registry of diagnostic templates, keyed by id and indexed by triage
/// target.
pub struct TemplateRegistry {
    templates: HashMap<String, DiagnosticTemplate>,
    by_target: HashMap<String, Vec<String>>,
}

impl TemplateRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            by_target: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with the shipped template set
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.register(template);
        }
        registry
    }

    /// Register a template programmatically
    pub fn register(&mut self, template: DiagnosticTemplate) {
        let id = template.id.clone();
        let target = template.triage_target.clone();
        self.templates.insert(id.clone(), template);
        let ids = self.by_target.entry(target).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Load templates from a directory of JSON files. Files that fail to
    /// parse or lack the required fields are skipped with a warning.
    pub fn load_from_dir<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let dir = path.as_ref();
        if !dir.exists() {
            warn!("Templates directory not found: {:?}", dir);
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in fs::read_dir(dir).context("Failed to read templates directory")? {
            let entry = entry?;
            let file_path = entry.path();
            if !file_path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match self.load_template_file(&file_path) {
                Ok(()) => {
                    debug!("Loaded template: {:?}", file_path);
                    loaded += 1;
                }
                Err(e) => warn!("Failed to load template {:?}: {}", file_path, e),
            }
        }
        Ok(loaded)
    }

    fn load_template_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let template: DiagnosticTemplate = serde_json::from_str(&content)?;
        if template.id.is_empty() || template.triage_target.is_empty() {
            anyhow::bail!("template is missing id or triageTarget");
        }
        self.register(template);
        Ok(())
    }

    /// Get template by id
    pub fn get_by_id(&self, id: &str) -> Option<&DiagnosticTemplate> {
        self.templates.get(id)
    }

    /// Select the best template for a triage target: the latest version by
    /// lexical compare when several are registered.
    pub fn select_by_target(&self, target: &str) -> Option<TemplateSelection<'_>> {
        let ids = self.by_target.get(target)?;
        let template = ids
            .iter()
            .filter_map(|id| self.templates.get(id))
            .max_by(|a, b| a.version.cmp(&b.version))?;
        Some(TemplateSelection {
            template,
            reason: format!("latest for target {}", target),
        })
    }

    /// Count registered templates
    pub fn count(&self) -> usize {
        self.templates.len()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn template(id: &str, target: &str, version: &str) -> DiagnosticTemplate {
        serde_json::from_value(json!({
            "id": id,
            "triageTarget": target,
            "version": version,
            "boundaries": { "maxSteps": 2, "timeoutMs": 5000 },
            "steps": [ { "tool": "oc_read_get_events", "params": {} } ]
        }))
        .unwrap()
    }

    #[test]
    fn builtins_cover_shipped_targets() {
        let registry = TemplateRegistry::with_builtins();
        for target in [
            "pvc-binding",
            "crashloopbackoff",
            "ingress-pending",
            "scheduling-failures",
        ] {
            assert!(
                registry.select_by_target(target).is_some(),
                "missing builtin for {}",
                target
            );
        }
    }

    #[test]
    fn select_prefers_latest_version() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("demo.v1", "demo", "1.0.0"));
        registry.register(template("demo.v2", "demo", "1.1.0"));
        let sel = registry.select_by_target("demo").unwrap();
        assert_eq!(sel.template.id, "demo.v2");
        assert!(sel.reason.contains("demo"));
    }

    #[test]
    fn unknown_target_selects_nothing() {
        let registry = TemplateRegistry::with_builtins();
        assert!(registry.select_by_target("no-such-target").is_none());
    }

    #[test]
    fn load_from_dir_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.json");
        let mut f = std::fs::File::create(&good).unwrap();
        write!(
            f,
            "{}",
            json!({
                "id": "disk.v1",
                "triageTarget": "disk-pressure",
                "boundaries": { "maxSteps": 1, "timeoutMs": 1000 },
                "steps": []
            })
        )
        .unwrap();

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let ignored = dir.path().join("notes.txt");
        std::fs::write(&ignored, "not a template").unwrap();

        let mut registry = TemplateRegistry::new();
        let loaded = registry.load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert!(registry.get_by_id("disk.v1").is_some());
    }

    #[test]
    fn missing_dir_is_not_an_error() {
        let mut registry = TemplateRegistry::new();
        let loaded = registry.load_from_dir("/nonexistent/templates").unwrap();
        assert_eq!(loaded, 0);
    }
}
