//! Intent normalization.
//!
//! Free-text operator input is mapped onto a closed set of canonical
//! intents, each of which names a template triage target.

use std::fmt;

/// The canonical triage intents the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalIntent {
    PvcBinding,
    CrashloopAnalysis,
    IngressPending,
    PvcStorageAffinity,
    SchedulingFailures,
    Route5xx,
    ApiDegraded,
    ClusterHealth,
    ScaleInstability,
    ZoneConflict,
}

impl CanonicalIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PvcBinding => "pvc-binding",
            Self::CrashloopAnalysis => "crashloop-analysis",
            Self::IngressPending => "ingress-pending",
            Self::PvcStorageAffinity => "pvc-storage-affinity",
            Self::SchedulingFailures => "scheduling-failures",
            Self::Route5xx => "route-5xx",
            Self::ApiDegraded => "api-degraded",
            Self::ClusterHealth => "cluster-health",
            Self::ScaleInstability => "scale-instability",
            Self::ZoneConflict => "zone-conflict",
        }
    }

    /// Template target this intent resolves to. Usually the intent name
    /// itself; crashloop analysis is the historical exception.
    pub fn template_target(&self) -> &'static str {
        match self {
            Self::CrashloopAnalysis => "crashloopbackoff",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for CanonicalIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synonym table checked in declaration order; the first canonical-name or
/// substring hit wins.
const SYNONYMS: &[(CanonicalIntent, &[&str])] = &[
    (
        CanonicalIntent::PvcBinding,
        &[
            "pvc",
            "pvc binding",
            "persistentvolumeclaim pending",
            "wffc",
            "wait for first consumer",
        ],
    ),
    (
        CanonicalIntent::CrashloopAnalysis,
        &["crashloop", "crashloopbackoff", "pod restart loop"],
    ),
    (
        CanonicalIntent::IngressPending,
        &["ingress pending", "router pending", "ingress stuck"],
    ),
    (
        CanonicalIntent::PvcStorageAffinity,
        &["storage affinity", "pv zone mismatch", "topology mismatch"],
    ),
    (
        CanonicalIntent::SchedulingFailures,
        &["scheduling", "unschedulable", "failedscheduling", "no nodes fit"],
    ),
    (
        CanonicalIntent::Route5xx,
        &["5xx", "route 5xx", "http 500", "gateway error"],
    ),
    (
        CanonicalIntent::ApiDegraded,
        &["api slow", "apiserver degraded", "k8s api degraded"],
    ),
    (
        CanonicalIntent::ClusterHealth,
        &["cluster health", "overall health", "operators degraded"],
    ),
    (
        CanonicalIntent::ScaleInstability,
        &["scale flapping", "replicas oscillating", "scaling instability"],
    ),
    (
        CanonicalIntent::ZoneConflict,
        &["zone conflict", "zonal skew", "az mismatch"],
    ),
];

/// Map free text to a canonical intent. Lowercased and trimmed first; an
/// exact canonical name wins, otherwise any synonym appearing as a
/// substring. Unknown text maps to None.
pub fn normalize_intent(input: &str) -> Option<CanonicalIntent> {
    let s = input.to_lowercase();
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    // The exact-name pass runs over the whole table before any substring
    // matching, so one entry's synonyms cannot shadow a later canonical
    // name ("pvc-storage-affinity" contains "pvc").
    for (canon, _) in SYNONYMS {
        if s == canon.as_str() {
            return Some(*canon);
        }
    }
    for (canon, words) in SYNONYMS {
        if words.iter().any(|w| s.contains(w)) {
            return Some(*canon);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for (canon, _) in SYNONYMS {
            assert_eq!(normalize_intent(canon.as_str()), Some(*canon));
        }
    }

    #[test]
    fn synonyms_resolve_as_substrings() {
        assert_eq!(
            normalize_intent("my PVC is stuck Pending"),
            Some(CanonicalIntent::PvcBinding)
        );
        assert_eq!(
            normalize_intent("pods in a crashloop again"),
            Some(CanonicalIntent::CrashloopAnalysis)
        );
        assert_eq!(
            normalize_intent("  FailedScheduling everywhere "),
            Some(CanonicalIntent::SchedulingFailures)
        );
    }

    #[test]
    fn exact_name_beats_earlier_synonyms() {
        // "pvc-storage-affinity" contains the pvc-binding synonym "pvc";
        // the exact canonical name must still win.
        assert_eq!(
            normalize_intent("pvc-storage-affinity"),
            Some(CanonicalIntent::PvcStorageAffinity)
        );
        assert_eq!(
            normalize_intent("  Pvc-Storage-Affinity "),
            Some(CanonicalIntent::PvcStorageAffinity)
        );
    }

    #[test]
    fn table_order_breaks_ties() {
        // "pvc" appears before the storage-affinity synonyms, so a phrase
        // containing both resolves to pvc-binding.
        assert_eq!(
            normalize_intent("pvc topology mismatch"),
            Some(CanonicalIntent::PvcBinding)
        );
    }

    #[test]
    fn unknown_text_is_none() {
        assert_eq!(normalize_intent("make me coffee"), None);
        assert_eq!(normalize_intent("   "), None);
    }

    #[test]
    fn crashloop_maps_to_its_template_target() {
        assert_eq!(
            CanonicalIntent::CrashloopAnalysis.template_target(),
            "crashloopbackoff"
        );
        assert_eq!(CanonicalIntent::PvcBinding.template_target(), "pvc-binding");
    }
}
