//! Triage core configuration.
//!
//! Loaded from a TOML file when present; every field has a working
//! default so a missing or partial file never blocks startup.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Default number of plan steps when a request does not ask.
    pub default_step_budget: usize,
    /// Plans are truncated to template boundaries unless disabled.
    pub bounded: bool,
    pub queue: QueueConfig,
    pub circuit: CircuitSettings,
    /// Extra template directory loaded on top of the builtins.
    pub templates_dir: Option<String>,
    /// Namespaces triage may touch; empty means unrestricted.
    pub allowed_namespaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub cancel_usage_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub window_ms: u64,
    pub max_repeat_calls_per_tool: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            default_step_budget: 3,
            bounded: true,
            queue: QueueConfig::default(),
            circuit: CircuitSettings::default(),
            templates_dir: None,
            allowed_namespaces: Vec::new(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            cancel_usage_threshold: 0.7,
        }
    }
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_repeat_calls_per_tool: 2,
        }
    }
}

impl TriageConfig {
    /// Load from a TOML file, falling back to defaults if it is missing
    /// or unreadable.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cfg) => {
                info!("Loaded triage config from {:?}", path);
                cfg
            }
            Err(e) => {
                warn!("Using default triage config ({:?}: {})", path, e);
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = TriageConfig::default();
        assert_eq!(cfg.default_step_budget, 3);
        assert!(cfg.bounded);
        assert_eq!(cfg.queue.concurrency, 6);
        assert_eq!(cfg.circuit.window_ms, 60_000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "default_step_budget = 5\n\n[queue]\nconcurrency = 2").unwrap();

        let cfg = TriageConfig::load_or_default(&path);
        assert_eq!(cfg.default_step_budget, 5);
        assert_eq!(cfg.queue.concurrency, 2);
        assert!((cfg.queue.cancel_usage_threshold - 0.7).abs() < f64::EPSILON);
        assert!(cfg.bounded);
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = TriageConfig::load_or_default("/nonexistent/triage.toml");
        assert_eq!(cfg.default_step_budget, 3);
    }
}
