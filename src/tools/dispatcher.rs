//! Resolve finalized tool calls against the registry and run them.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::accumulator::FinalizedToolCall;
use super::arguments::ToolArguments;
use super::capability::CallerIdentity;
use super::registry::CapabilityRegistry;
use crate::provider::format::tool_result_to_string;
use crate::types::ToolMessage;

/// Default cap on serialized tool output, in bytes.
pub const DEFAULT_TRUNCATION_CAP: usize = 64 * 1024;

/// Runs tool calls and turns every outcome into a [`ToolMessage`].
///
/// Unknown names, bad arguments and handler failures all come back as
/// `success = false` messages. Nothing here fails a turn.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
    truncation_cap: usize,
    limiter: Option<Arc<Semaphore>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            truncation_cap: DEFAULT_TRUNCATION_CAP,
            limiter: None,
        }
    }

    pub fn with_truncation_cap(mut self, cap: usize) -> Self {
        self.truncation_cap = cap;
        self
    }

    /// Bound how many capabilities run at once. `None` or `0` is unbounded.
    pub fn with_max_parallel(mut self, limit: Option<usize>) -> Self {
        self.limiter = limit
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn truncation_cap(&self) -> usize {
        self.truncation_cap
    }

    /// Run a single call to completion.
    pub async fn dispatch(&self, call: &FinalizedToolCall, caller: &CallerIdentity) -> ToolMessage {
        execute_call(&self.registry, self.truncation_cap, call, caller).await
    }

    /// Run every call concurrently and return results in the calls' order.
    ///
    /// Returns `None` if `cancel` fires first. Calls still waiting for a
    /// concurrency permit are then never invoked; calls already running are
    /// left to finish in the background and their results are dropped.
    pub async fn dispatch_all(
        &self,
        calls: Vec<FinalizedToolCall>,
        caller: &CallerIdentity,
        cancel: &CancellationToken,
    ) -> Option<Vec<ToolMessage>> {
        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let key = (call.id.clone(), call.name.clone());
                let registry = Arc::clone(&self.registry);
                let limiter = self.limiter.clone();
                let caller = caller.clone();
                let cancel = cancel.clone();
                let cap = self.truncation_cap;
                let handle = tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(semaphore) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return None,
                            permit = semaphore.acquire_owned() => permit.ok(),
                        },
                        None => None,
                    };
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(execute_call(&registry, cap, &call, &caller).await)
                });
                (key, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for ((id, name), handle) in handles {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                joined = handle => joined,
            };
            match joined {
                Ok(Some(message)) => results.push(message),
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(tool_call_id = %id, tool_name = %name, error = %err, "capability task aborted");
                    results.push(failure_message(
                        id,
                        name.clone(),
                        format!("Error: tool '{name}' did not complete"),
                        self.truncation_cap,
                    ));
                }
            }
        }
        Some(results)
    }
}

async fn execute_call(
    registry: &CapabilityRegistry,
    cap: usize,
    call: &FinalizedToolCall,
    caller: &CallerIdentity,
) -> ToolMessage {
    if call.name.is_empty() {
        return failure_message(
            call.id.clone(),
            String::new(),
            "Error: tool call is missing a function name".to_string(),
            cap,
        );
    }
    let Some(capability) = registry.get(&call.name) else {
        tracing::debug!(tool_call_id = %call.id, tool_name = %call.name, "unknown capability");
        return failure_message(
            call.id.clone(),
            call.name.clone(),
            format!("Error: unknown tool '{}'", call.name),
            cap,
        );
    };
    let args = match &call.arguments {
        Ok(map) => ToolArguments::new(map.clone()),
        Err(parse_error) => {
            tracing::debug!(tool_call_id = %call.id, tool_name = %call.name, "argument parse failure");
            return failure_message(
                call.id.clone(),
                call.name.clone(),
                format!("Error: {parse_error}"),
                cap,
            );
        }
    };

    tracing::debug!(tool_call_id = %call.id, tool_name = %call.name, "invoking capability");
    match capability.invoke(&args, caller).await {
        Ok(value) => {
            let (content, truncated) = truncate_result(tool_result_to_string(&value), cap);
            if truncated {
                tracing::warn!(tool_call_id = %call.id, tool_name = %call.name, cap, "tool result truncated");
            }
            ToolMessage {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                success: true,
                truncated,
            }
        }
        Err(err) => failure_message(
            call.id.clone(),
            call.name.clone(),
            format!("Error: {err}"),
            cap,
        ),
    }
}

fn failure_message(tool_call_id: String, name: String, content: String, cap: usize) -> ToolMessage {
    let (content, truncated) = truncate_result(content, cap);
    ToolMessage {
        tool_call_id,
        name,
        content,
        success: false,
        truncated,
    }
}

/// Cut `content` to at most `cap` bytes.
///
/// The cut lands on the last UTF-8 character boundary at or below `cap`, so
/// ASCII output is exactly `cap` bytes. Returns whether anything was removed.
pub fn truncate_result(mut content: String, cap: usize) -> (String, bool) {
    if content.len() <= cap {
        return (content, false);
    }
    let mut end = cap;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
    (content, true)
}
