//! Bounded fanout over a tool client.
//!
//! The queue owns a time budget and a cancellation latch. Work is spawned
//! eagerly; fanout lanes check the latch and the clock before each call so
//! a blown budget stops new work instead of racing it.

use crate::budget::{Budget, MAX_CONCURRENCY, MIN_TIME_BUDGET_MS};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Seam to the cluster tool layer. Implementations perform read-only calls
/// and return the raw tool output as JSON.
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn call(&self, tool: &str, args: Json) -> Result<Json>;
}

/// One request in a fanout batch.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: String,
    pub args: Json,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, args: Json) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Queue tuning. `time_ms` of zero means no deadline.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub concurrency: usize,
    /// Fraction of the time budget after which the queue cancels itself.
    pub cancel_usage_threshold: f64,
    pub time_ms: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 6,
            cancel_usage_threshold: 0.7,
            time_ms: 0,
        }
    }
}

/// Orchestration queue: named enqueue/wait for setup phases plus a
/// concurrency-bounded fanout for the wide phase.
pub struct OrchestrationQueue {
    client: Arc<dyn ToolClient>,
    opts: QueueOptions,
    start: Instant,
    cancelled: AtomicBool,
    inflight: Mutex<HashMap<String, tokio::task::JoinHandle<Json>>>,
}

impl OrchestrationQueue {
    pub fn new(client: Arc<dyn ToolClient>, opts: QueueOptions) -> Self {
        let opts = QueueOptions {
            concurrency: opts.concurrency.clamp(1, MAX_CONCURRENCY),
            ..opts
        };
        Self {
            client,
            opts,
            start: Instant::now(),
            cancelled: AtomicBool::new(false),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Milliseconds spent since the queue was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Latch further work off. Already-running calls finish on their own.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn exceeded_time(&self) -> bool {
        self.opts.time_ms > 0 && self.elapsed_ms() >= self.opts.time_ms
    }

    /// Spawn a named call. Errors are folded into the result payload so a
    /// failed lookup never takes the whole orchestration down.
    pub fn enqueue(&self, name: &str, tool: &str, args: Json) {
        if self.is_cancelled() || self.exceeded_time() {
            debug!("Queue closed; dropping enqueue of {}", name);
            return;
        }
        let client = Arc::clone(&self.client);
        let tool = tool.to_string();
        let handle = tokio::spawn(async move {
            match client.call(&tool, args).await {
                Ok(v) => v,
                Err(e) => json!({ "error": e.to_string() }),
            }
        });
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.insert(name.to_string(), handle);
        }
    }

    /// Wait for previously enqueued calls, in the order asked for. Unknown
    /// or panicked entries resolve to Null.
    pub async fn wait(&self, names: &[&str]) -> Vec<Json> {
        let mut handles = Vec::with_capacity(names.len());
        {
            let mut inflight = match self.inflight.lock() {
                Ok(g) => g,
                Err(_) => return names.iter().map(|_| Json::Null).collect(),
            };
            for name in names {
                handles.push(inflight.remove(*name));
            }
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle {
                Some(h) => out.push(h.await.unwrap_or(Json::Null)),
                None => out.push(Json::Null),
            }
        }
        out
    }

    /// Run a batch with at most `concurrency` calls in flight. Results come
    /// back in completion order; callers needing correlation should echo an
    /// identifier in each request's args. Lanes stop picking up work once
    /// the queue is cancelled or the time budget is spent. `on_partial`
    /// sees each result as it lands.
    pub async fn fanout(
        &self,
        label: &str,
        requests: Vec<ToolRequest>,
        on_partial: Option<&(dyn Fn(&Json) + Send + Sync)>,
    ) -> Vec<Json> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }
        let lanes = self.opts.concurrency.min(total);
        debug!("Fanout {}: {} requests across {} lanes", label, total, lanes);

        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<Json>> = Mutex::new(Vec::with_capacity(total));
        let requests = &requests;
        let next = &next;
        let results = &results;

        let workers = (0..lanes).map(|_| async move {
            loop {
                if self.is_cancelled() {
                    break;
                }
                if self.exceeded_time() {
                    warn!("Fanout {}: time budget spent, cancelling", label);
                    self.cancel();
                    break;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                if idx >= total {
                    break;
                }
                let req = &requests[idx];
                let value = match self.client.call(&req.tool, req.args.clone()).await {
                    Ok(v) => v,
                    Err(e) => json!({ "error": e.to_string() }),
                };
                if let Some(cb) = on_partial {
                    cb(&value);
                }
                if let Ok(mut done) = results.lock() {
                    done.push(value);
                }
                if self.opts.time_ms > 0 {
                    let used = self.elapsed_ms() as f64 / self.opts.time_ms as f64;
                    if used >= self.opts.cancel_usage_threshold {
                        warn!(
                            "Fanout {}: {:.0}% of budget used, cancelling remainder",
                            label,
                            used * 100.0
                        );
                        self.cancel();
                        break;
                    }
                }
            }
        });
        futures::future::join_all(workers).await;

        let done = match results.lock() {
            Ok(done) => done.clone(),
            Err(_) => Vec::new(),
        };
        done
    }
}

/// Two-phase PVC triage fanout: a short discovery slice to find candidate
/// namespaces, then per-namespace triage inside the remaining budget.
pub async fn pvc_triage_orchestration(
    client: Arc<dyn ToolClient>,
    session_id: &str,
    budget: &Budget,
    namespace_filters: &[String],
) -> Vec<Json> {
    let budget = budget.clamped();
    let discovery_ms = (budget.time_ms as f64 * 0.3) as u64;
    let discovery = OrchestrationQueue::new(
        Arc::clone(&client),
        QueueOptions {
            concurrency: budget.concurrency.unwrap_or(6),
            cancel_usage_threshold: 0.95,
            time_ms: discovery_ms.max(MIN_TIME_BUDGET_MS),
        },
    );

    discovery.enqueue(
        "health",
        "oc_diagnostic_cluster_health",
        json!({ "sessionId": session_id }),
    );
    discovery.enqueue(
        "namespaces",
        "oc_read_list_namespaces",
        json!({ "sessionId": session_id }),
    );
    let discovered = discovery.wait(&["health", "namespaces"]).await;

    // Signal namespaces from the health report go first, then the plain
    // listing fills up to the cap.
    let mut ordered: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for ns in extract_namespaces(&discovered[0]).into_iter().chain(extract_namespaces(&discovered[1])) {
        if !namespace_filters.is_empty() && !namespace_filters.contains(&ns) {
            continue;
        }
        if seen.insert(ns.clone()) {
            ordered.push(ns);
        }
    }
    let cap = budget.namespace_limit.unwrap_or(MAX_NAMESPACE_LIMIT_DEFAULT);
    ordered.truncate(cap);
    if ordered.is_empty() {
        debug!("PVC orchestration {}: no candidate namespaces", session_id);
        return Vec::new();
    }

    let triage_ms = (budget.time_ms as f64 * 0.6) as u64;
    let per_request_ms = (triage_ms / ordered.len() as u64).max(3000);
    let queue = OrchestrationQueue::new(
        client,
        QueueOptions {
            concurrency: budget.concurrency.unwrap_or(6),
            cancel_usage_threshold: 0.95,
            time_ms: triage_ms.max(MIN_TIME_BUDGET_MS),
        },
    );
    let requests = ordered
        .iter()
        .map(|ns| {
            ToolRequest::new(
                "oc_diagnostic_triage",
                json!({
                    "intent": "pvc-binding",
                    "namespace": ns,
                    "sessionId": session_id,
                    "timeBudgetMs": per_request_ms,
                }),
            )
        })
        .collect();
    queue.fanout("pvc-triage", requests, None).await
}

const MAX_NAMESPACE_LIMIT_DEFAULT: usize = 20;

/// Pull namespace names out of a discovery result, tolerating the shapes
/// the tools actually return.
fn extract_namespaces(value: &Json) -> Vec<String> {
    let mut out = Vec::new();
    let candidates = [
        value.get("signalNamespaces"),
        value.get("namespaces"),
        value.get("items"),
        Some(value),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Some(items) = candidate.as_array() {
            for item in items {
                match item {
                    Json::String(s) => out.push(s.clone()),
                    Json::Object(obj) => {
                        if let Some(name) = obj
                            .get("name")
                            .or_else(|| obj.get("metadata").and_then(|m| m.get("name")))
                            .and_then(|n| n.as_str())
                        {
                            out.push(name.to_string());
                        }
                    }
                    _ => {}
                }
            }
            if !out.is_empty() {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoClient;

    #[async_trait]
    impl ToolClient for EchoClient {
        async fn call(&self, tool: &str, args: Json) -> Result<Json> {
            Ok(json!({ "tool": tool, "args": args }))
        }
    }

    #[tokio::test]
    async fn wait_preserves_request_order() {
        let queue = OrchestrationQueue::new(Arc::new(EchoClient), QueueOptions::default());
        queue.enqueue("b", "tool_b", json!({}));
        queue.enqueue("a", "tool_a", json!({}));
        let out = queue.wait(&["a", "b", "missing"]).await;
        assert_eq!(out[0]["tool"], "tool_a");
        assert_eq!(out[1]["tool"], "tool_b");
        assert!(out[2].is_null());
    }

    #[tokio::test]
    async fn fanout_runs_every_request_and_echoes_correlation_args() {
        let queue = OrchestrationQueue::new(Arc::new(EchoClient), QueueOptions::default());
        let requests = (0..8)
            .map(|i| ToolRequest::new("echo", json!({ "i": i })))
            .collect();
        let out = queue.fanout("test", requests, None).await;
        assert_eq!(out.len(), 8);
        // Completion order is not guaranteed; correlate via echoed args.
        let mut seen: Vec<u64> = out
            .iter()
            .map(|v| v["args"]["i"].as_u64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    struct FailingClient;

    #[async_trait]
    impl ToolClient for FailingClient {
        async fn call(&self, _tool: &str, _args: Json) -> Result<Json> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn errors_become_result_payloads() {
        let queue = OrchestrationQueue::new(Arc::new(FailingClient), QueueOptions::default());
        let out = queue
            .fanout("test", vec![ToolRequest::new("x", json!({}))], None)
            .await;
        assert_eq!(out[0]["error"], json!("connection refused"));
    }

    #[test]
    fn namespaces_extract_from_common_shapes() {
        let plain = json!({ "namespaces": ["a", "b"] });
        assert_eq!(extract_namespaces(&plain), vec!["a", "b"]);

        let objects = json!({ "items": [ { "metadata": { "name": "c" } } ] });
        assert_eq!(extract_namespaces(&objects), vec!["c"]);

        let bare = json!(["d"]);
        assert_eq!(extract_namespaces(&bare), vec!["d"]);

        assert!(extract_namespaces(&json!({})).is_empty());
    }
}
