//! Orchestration queue tests.
//!
//! Concurrency ceilings and budget-driven cancellation, verified with a
//! fake tool client that records how many calls run at once.

use anyhow::Result;
use async_trait::async_trait;
use octriage::budget::Budget;
use octriage::queue::pvc_triage_orchestration;
use octriage::{OrchestrationQueue, QueueOptions, ToolClient, ToolRequest};
use serde_json::{json, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

/// Sleeps per call and tracks the peak number of concurrent calls.
struct SlowClient {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl SlowClient {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolClient for SlowClient {
    async fn call(&self, _tool: &str, args: Json) -> Result<Json> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(args)
    }
}

fn requests(n: usize) -> Vec<ToolRequest> {
    (0..n)
        .map(|i| ToolRequest::new("echo", json!({ "i": i })))
        .collect()
}

// ============================================================================
// Concurrency ceiling
// ============================================================================

/// The fanout never has more calls in flight than its concurrency setting.
#[tokio::test]
async fn fanout_respects_concurrency_ceiling() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(10)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions {
            concurrency: 3,
            cancel_usage_threshold: 1.0,
            time_ms: 0,
        },
    );

    let out = queue.fanout("ceiling", requests(12), None).await;
    assert_eq!(out.len(), 12);
    assert_eq!(client.total(), 12);
    assert!(
        client.peak() <= 3,
        "peak concurrency {} exceeded lane count",
        client.peak()
    );
}

/// Concurrency settings above the process ceiling are clamped at
/// construction.
#[tokio::test]
async fn concurrency_is_clamped_to_process_ceiling() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(5)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions {
            concurrency: 1000,
            cancel_usage_threshold: 1.0,
            time_ms: 0,
        },
    );

    queue.fanout("clamp", requests(30), None).await;
    assert!(client.peak() <= octriage::budget::MAX_CONCURRENCY);
}

// ============================================================================
// Budget cancellation
// ============================================================================

/// Crossing the usage threshold cancels the remainder of the batch; only
/// completed calls appear in the results.
#[tokio::test]
async fn threshold_cancels_remaining_work() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(30)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions {
            concurrency: 1,
            cancel_usage_threshold: 0.5,
            time_ms: 100,
        },
    );

    let out = queue.fanout("budget", requests(10), None).await;
    assert!(queue.is_cancelled());
    assert!(!out.is_empty(), "at least one call should land");
    assert!(out.len() < 10, "cancellation must leave work undone");
    assert_eq!(client.total(), out.len());
}

/// With no deadline the whole batch runs.
#[tokio::test]
async fn zero_time_budget_means_no_deadline() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions::default(),
    );

    let out = queue.fanout("open", requests(20), None).await;
    assert_eq!(out.len(), 20);
    assert!(!queue.is_cancelled());
}

/// An explicit cancel latches: later enqueues are dropped and fanout lanes
/// do not pick up work.
#[tokio::test]
async fn cancel_latches_the_queue() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions::default(),
    );

    queue.cancel();
    queue.enqueue("late", "echo", json!({}));
    let waited = queue.wait(&["late"]).await;
    assert!(waited[0].is_null(), "enqueue after cancel must be dropped");

    let out = queue.fanout("cancelled", requests(4), None).await;
    assert!(out.is_empty());
    assert_eq!(client.total(), 0);
}

// ============================================================================
// Partial results
// ============================================================================

/// The partial-result callback observes every completed call.
#[tokio::test]
async fn on_partial_sees_each_result() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions::default(),
    );

    let seen = AtomicUsize::new(0);
    let out = queue
        .fanout(
            "partial",
            requests(7),
            Some(&|_v: &Json| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
    assert_eq!(out.len(), 7);
    assert_eq!(seen.load(Ordering::SeqCst), 7);
}

// ============================================================================
// PVC orchestration
// ============================================================================

/// Answers discovery calls with canned namespaces and records every tool
/// name used.
struct RecordingClient {
    tools: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolClient for RecordingClient {
    async fn call(&self, tool: &str, args: Json) -> Result<Json> {
        self.tools.lock().unwrap().push(tool.to_string());
        match tool {
            "oc_diagnostic_cluster_health" => {
                Ok(json!({ "signalNamespaces": ["prod-a"] }))
            }
            "oc_read_list_namespaces" => {
                Ok(json!({ "namespaces": ["prod-a", "prod-b"] }))
            }
            _ => Ok(json!({ "echo": args })),
        }
    }
}

/// The two-phase pvc orchestration speaks the published tool names:
/// cluster health and namespace listing for discovery, diagnostic triage
/// for the fanout.
#[tokio::test]
async fn pvc_orchestration_uses_published_tool_names() {
    let client = Arc::new(RecordingClient {
        tools: Mutex::new(Vec::new()),
    });
    let budget = Budget {
        time_ms: 60_000,
        namespace_limit: Some(10),
        concurrency: Some(2),
    };
    let results = pvc_triage_orchestration(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        "session-1",
        &budget,
        &[],
    )
    .await;
    assert_eq!(results.len(), 2, "one triage per discovered namespace");

    let tools = client.tools.lock().unwrap().clone();
    assert!(tools.contains(&"oc_diagnostic_cluster_health".to_string()));
    assert!(tools.contains(&"oc_read_list_namespaces".to_string()));
    assert_eq!(
        tools
            .iter()
            .filter(|t| t.as_str() == "oc_diagnostic_triage")
            .count(),
        2
    );
}

/// Named enqueue/wait answers in the order asked, independent of spawn
/// order.
#[tokio::test]
async fn enqueue_wait_is_order_stable() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
    let queue = OrchestrationQueue::new(
        Arc::clone(&client) as Arc<dyn ToolClient>,
        QueueOptions::default(),
    );

    queue.enqueue("second", "echo", json!({ "n": 2 }));
    queue.enqueue("first", "echo", json!({ "n": 1 }));
    let out = queue.wait(&["first", "second"]).await;
    assert_eq!(out[0]["n"], json!(1));
    assert_eq!(out[1]["n"], json!(2));
}
