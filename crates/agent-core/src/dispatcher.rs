//! Tool Dispatcher
//!
//! Executes a batch of tool calls as one fork/join:
//!
//! ```text
//!   calls ──► lanes ──────────────────────────────► results (input order)
//!             knowledge: [c0 → c3]   (serial)
//!             image:     [c2]        (serial)
//!             risk:      [c1] [c4]   (one lane per call)
//! ```
//!
//! Contended groups share a lane so their calls never overlap; every other
//! call gets its own lane. All lanes run concurrently under a semaphore of
//! `max_concurrency` permits. Each call runs in its own task with a timeout,
//! so a slow, failing or panicking tool only affects its own result entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::events::{EventSink, ToolCallStatus};
use crate::tool::{Tool, ToolCall, ToolGroup, ToolRegistry, ToolResult};

/// Error recorded when a call exceeds its timeout
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error recorded when a call names an unregistered tool
pub const NOT_FOUND_ERROR: &str = "tool not found";

/// Dispatcher configuration
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Maximum calls executing at once within one batch
    pub max_concurrency: usize,

    /// Per-call timeout
    pub call_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Grouped, bounded, timeout-guarded tool executor
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    config: DispatcherConfig,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, config: DispatcherConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Execute `calls`, returning one result per call in the same order
    pub async fn dispatch(&self, calls: &[ToolCall], events: &EventSink) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        let permits = Semaphore::new(self.config.max_concurrency.max(1));
        let permits = &permits;

        let lanes = self.plan_lanes(calls);
        tracing::debug!(calls = calls.len(), lanes = lanes.len(), "Dispatching tool batch");

        let lane_futures = lanes.into_iter().map(|indices| async move {
            let mut out = Vec::with_capacity(indices.len());
            for index in indices {
                let result = self.run_call(&calls[index], permits, events).await;
                out.push((index, result));
            }
            out
        });

        let mut indexed: Vec<(usize, ToolResult)> =
            join_all(lane_futures).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Partition call indices into lanes; indices stay ascending within a lane
    fn plan_lanes(&self, calls: &[ToolCall]) -> Vec<Vec<usize>> {
        let mut shared: BTreeMap<ToolGroup, Vec<usize>> = BTreeMap::new();
        let mut lanes = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            let group = self.registry.group_of(&call.name);
            if group.is_contended() {
                shared.entry(group).or_default().push(index);
            } else {
                lanes.push(vec![index]);
            }
        }

        lanes.extend(shared.into_values());
        lanes
    }

    async fn run_call(&self, call: &ToolCall, permits: &Semaphore, events: &EventSink) -> ToolResult {
        let Ok(tool) = self.registry.resolve(&call.name) else {
            tracing::warn!(tool = %call.name, "Requested tool is not registered");
            events.tool_result(&call.name, false);
            return ToolResult::failure(call, ToolGroup::Other, NOT_FOUND_ERROR, 0);
        };
        let group = tool.schema().group;

        let _permit = permits.acquire().await.ok();
        events.tool_call(&call.name, ToolCallStatus::Executing);

        let started = Instant::now();
        let outcome = match tool.validate(&call.args) {
            Ok(()) => self.invoke(tool, call).await,
            Err(e) => Err(e.to_string()),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(value) => {
                tracing::debug!(tool = %call.name, duration_ms, "Tool succeeded");
                ToolResult::success(call, group, value, duration_ms)
            }
            Err(error) => {
                tracing::warn!(tool = %call.name, duration_ms, %error, "Tool failed");
                ToolResult::failure(call, group, error, duration_ms)
            }
        };
        events.tool_result(&call.name, result.success);
        result
    }

    /// Run the tool in its own task so panics and timeouts stay contained
    async fn invoke(&self, tool: Arc<dyn Tool>, call: &ToolCall) -> Result<serde_json::Value, String> {
        let args = call.args.clone();
        let handle = tokio::spawn(async move { tool.execute(&args).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.config.call_timeout, handle).await {
            Err(_) => {
                abort.abort();
                Err(TIMEOUT_ERROR.to_string())
            }
            Ok(Err(join_error)) if join_error.is_panic() => Err("tool panicked".to_string()),
            Ok(Err(_)) => Err("tool cancelled".to_string()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}
