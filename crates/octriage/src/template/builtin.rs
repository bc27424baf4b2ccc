//! Shipped template set.
//!
//! One bounded template per shipped triage target. Every step is a
//! read-only query; evidence contracts name what a conclusive run should
//! have seen.

use super::DiagnosticTemplate;
use serde_json::json;
use tracing::warn;

/// The built-in templates. Definitions that fail to decode are skipped
/// with a warning rather than failing startup.
pub fn builtin_templates() -> Vec<DiagnosticTemplate> {
    [
        pvc_binding_v1(),
        crashloopbackoff_v1(),
        ingress_pending_v1(),
        scheduling_failures_v1(),
    ]
    .into_iter()
    .filter_map(|def| match serde_json::from_value(def) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("Skipping unloadable builtin template: {}", e);
            None
        }
    })
    .collect()
}

fn pvc_binding_v1() -> serde_json::Value {
    json!({
        "id": "pvc-binding.v1",
        "title": "PVC binding triage",
        "version": "1.0.0",
        "triageTarget": "pvc-binding",
        "boundaries": { "maxSteps": 3, "timeoutMs": 15000 },
        "steps": [
            {
                "tool": "oc_read_describe",
                "params": { "resourceType": "pvc", "name": "<pvc>", "namespace": "<ns>" },
                "rationale": "Claim phase and binding condition"
            },
            {
                "tool": "oc_read_get_events",
                "params": {
                    "namespace": "<ns>",
                    "fieldSelector": "involvedObject.kind=PersistentVolumeClaim"
                },
                "rationale": "Provisioning and binding events"
            },
            {
                "tool": "oc_read_get_storageclasses",
                "params": {},
                "rationale": "Provisioner and binding mode in play"
            }
        ],
        "evidenceContract": {
            "version": "1.0",
            "required": ["claimPhase", "bindingEvents", "storageClass"],
            "selectors": {
                "claimPhase": [
                    { "type": "dsl", "path": "Pending" },
                    { "type": "jsonpath", "path": "{.status.phase}" }
                ],
                "bindingEvents": [
                    { "type": "eventsRegex",
                      "path": "provisioning|waitforfirstconsumer|failedbinding|no persistent volumes" }
                ],
                "storageClass": [
                    { "type": "jsonpath", "path": "{.spec.storageClassName}" },
                    { "type": "eventsRegex", "path": "storageclass|provisioner" }
                ]
            },
            "completenessThreshold": 0.67
        }
    })
}

fn crashloopbackoff_v1() -> serde_json::Value {
    json!({
        "id": "crashloopbackoff.v1",
        "title": "CrashLoopBackOff triage",
        "version": "1.0.0",
        "triageTarget": "crashloopbackoff",
        "boundaries": { "maxSteps": 3, "timeoutMs": 15000 },
        "steps": [
            {
                "tool": "oc_read_describe",
                "params": { "resourceType": "pod", "name": "<pod>", "namespace": "<ns>" },
                "rationale": "Restart count and last state"
            },
            {
                "tool": "oc_read_get_events",
                "params": { "namespace": "<ns>", "fieldSelector": "reason=BackOff" },
                "rationale": "BackOff event cadence"
            },
            {
                "tool": "oc_read_logs",
                "params": { "name": "<pod>", "namespace": "<ns>", "previous": true },
                "rationale": "Exit reason from the previous container"
            }
        ],
        "evidenceContract": {
            "version": "1.0",
            "required": ["restartEvidence", "lastState"],
            "selectors": {
                "restartEvidence": [
                    { "type": "eventsRegex", "path": "back-?off|crashloop|restarting" }
                ],
                "lastState": [
                    { "type": "jsonpath", "path": "{.status.containerStatuses[*].lastState}" },
                    { "type": "eventsRegex", "path": "exit code|oomkilled|error" }
                ]
            },
            "completenessThreshold": 0.5
        }
    })
}

fn ingress_pending_v1() -> serde_json::Value {
    json!({
        "id": "ingress-pending.v1",
        "title": "Ingress pending triage",
        "version": "1.0.0",
        "triageTarget": "ingress-pending",
        "boundaries": { "maxSteps": 3, "timeoutMs": 15000 },
        "steps": [
            {
                "tool": "oc_read_get_pods",
                "params": { "namespace": "openshift-ingress", "selector": "ingresscontroller.operator.openshift.io/deployment-ingresscontroller" },
                "rationale": "Router pod phase"
            },
            {
                "tool": "oc_read_get_events",
                "params": { "namespace": "openshift-ingress" },
                "rationale": "Scheduling events for router pods"
            },
            {
                "tool": "oc_read_describe",
                "params": {
                    "resourceType": "ingresscontroller",
                    "name": "default",
                    "namespace": "openshift-ingress-operator"
                },
                "rationale": "Controller availability conditions"
            }
        ],
        "evidenceContract": {
            "version": "1.0",
            "required": ["routerPods", "schedulingEvents", "controllerStatus"],
            "selectors": {
                "routerPods": [
                    { "type": "eventsRegex", "path": "router-|ingress" },
                    { "type": "jsonpath", "path": "{.items[*].status.phase}" }
                ],
                "schedulingEvents": [
                    { "type": "eventsRegex", "path": "failedscheduling|pending|unschedulable" }
                ],
                "controllerStatus": [
                    { "type": "jsonpath", "path": "{.status.conditions[*].type}" },
                    { "type": "eventsRegex", "path": "degraded|available" }
                ]
            },
            "completenessThreshold": 0.67
        }
    })
}

fn scheduling_failures_v1() -> serde_json::Value {
    json!({
        "id": "scheduling-failures.v1",
        "title": "Scheduling failures triage",
        "version": "1.0.0",
        "triageTarget": "scheduling-failures",
        "boundaries": { "maxSteps": 3, "timeoutMs": 15000 },
        "steps": [
            {
                "tool": "oc_read_get_events",
                "params": { "namespace": "<ns>", "fieldSelector": "reason=FailedScheduling" },
                "rationale": "Why the scheduler refused placement"
            },
            {
                "tool": "oc_read_describe",
                "params": { "resourceType": "pod", "name": "<pod>", "namespace": "<ns>" },
                "rationale": "Requested resources and tolerations"
            },
            {
                "tool": "oc_read_get_nodes",
                "params": { "output": "json" },
                "rationale": "Node taints and allocatable headroom"
            }
        ],
        "evidenceContract": {
            "version": "1.0",
            "required": ["schedulingEvents", "nodeConstraints"],
            "selectors": {
                "schedulingEvents": [
                    { "type": "eventsRegex",
                      "path": "failedscheduling|insufficient|no nodes (are )?available" }
                ],
                "nodeConstraints": [
                    { "type": "jsonpath", "path": "{.items[*].spec.taints[*].key}" },
                    { "type": "eventsRegex", "path": "taint|affinity|selector" }
                ]
            },
            "completenessThreshold": 0.5
        }
    })
}
