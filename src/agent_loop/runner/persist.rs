use crate::session::{PendingMessage, PersistedMessageRecord, TurnOutcome};
use crate::types::{Message, Role};

use super::super::types::{TurnId, TurnStatus};

/// Idempotency key of the `index`-th message of a turn.
pub(super) fn operation_id(turn_id: TurnId, index: usize) -> String {
    format!("{turn_id}:{index}")
}

/// Key the turn's messages for commit. The first one is the user message.
pub(super) fn pending_messages(
    turn_id: TurnId,
    user_operation_id: &str,
    messages: Vec<Message>,
) -> Vec<PendingMessage> {
    messages
        .into_iter()
        .enumerate()
        .map(|(index, message)| PendingMessage {
            operation_id: match index {
                0 => user_operation_id.to_string(),
                _ => operation_id(turn_id, index),
            },
            message,
        })
        .collect()
}

/// How a stored turn ended. Turns written without an outcome count as completed.
pub(super) fn stored_outcome(records: &[PersistedMessageRecord]) -> TurnOutcome {
    records
        .first()
        .and_then(|r| r.turn_outcome.clone())
        .unwrap_or(TurnOutcome {
            status: TurnStatus::Completed,
            error: None,
        })
}

/// Text of the last assistant message without tool calls.
pub(super) fn final_text(records: &[PersistedMessageRecord]) -> Option<String> {
    records
        .iter()
        .rev()
        .find(|r| r.role() == Role::Assistant && r.tool_calls().is_empty())
        .and_then(|r| r.content().map(str::to_string))
}
