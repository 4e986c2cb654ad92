use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use super::super::events::TurnEventPayload;
use super::control::TurnEventEmitter;
use crate::tools::{CallerIdentity, FinalizedToolCall, ToolDispatcher};
use crate::types::ToolMessage;

const SUMMARY_DETAIL_CHARS: usize = 200;

pub(super) enum ToolPhaseOutcome {
    Executed(Vec<ToolMessage>),
    Canceled,
}

/// Drop repeated ids and calls beyond the per-round cap.
pub(super) fn screen_calls(
    calls: Vec<FinalizedToolCall>,
    max_per_round: usize,
    emitter: &TurnEventEmitter,
    round: u32,
) -> Vec<FinalizedToolCall> {
    let mut seen = HashSet::new();
    let total = calls.len();
    let mut unique: Vec<_> = calls
        .into_iter()
        .filter(|call| seen.insert(call.id.clone()))
        .collect();
    let duplicates = total - unique.len();
    if duplicates > 0 {
        tracing::warn!(round, count = duplicates, "duplicate tool call ids dropped");
        emitter.emit(TurnEventPayload::ToolCallsDeduplicated { count: duplicates });
    }

    if unique.len() > max_per_round {
        let excess = unique.len() - max_per_round;
        unique.truncate(max_per_round);
        tracing::warn!(
            round,
            count = excess,
            max_per_round,
            "tool calls over the per-round limit dropped"
        );
        emitter.emit(TurnEventPayload::ToolCallsDropped { count: excess });
    }
    unique
}

pub(super) async fn run_tool_phase(
    dispatcher: &ToolDispatcher,
    calls: Vec<FinalizedToolCall>,
    caller: &CallerIdentity,
    cancel: &CancellationToken,
    emitter: &TurnEventEmitter,
) -> ToolPhaseOutcome {
    let Some(results) = dispatcher.dispatch_all(calls, caller, cancel).await else {
        return ToolPhaseOutcome::Canceled;
    };
    for result in &results {
        emitter.emit(TurnEventPayload::ToolResult {
            tool_call_id: result.tool_call_id.clone(),
            name: result.name.clone(),
            success: result.success,
            truncated: result.truncated,
        });
    }
    ToolPhaseOutcome::Executed(results)
}

/// Plain-text account of the tool results of a turn.
pub(super) fn summarize_results(results: &[ToolMessage]) -> String {
    let mut summary = String::from("Here is what was done:");
    for result in results {
        let outcome = if result.success { "succeeded" } else { "failed" };
        summary.push_str(&format!("\n- {}: {outcome}", result.name));
        let detail = first_line(&result.content);
        if !detail.is_empty() {
            summary.push_str(&format!(" ({detail})"));
        }
    }
    summary
}

fn first_line(content: &str) -> String {
    let line = content.lines().next().unwrap_or("").trim();
    if line.chars().count() <= SUMMARY_DETAIL_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(SUMMARY_DETAIL_CHARS).collect();
    cut.push_str("...");
    cut
}
