//! Durable, ordered, idempotent message history.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemorySessionStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_loop::TurnStatus;
use crate::error::Result;
use crate::types::{Message, Role, ToolCallRequest};

/// One stored message.
///
/// Never mutated after creation; only removed by [`SessionStore::delete_after`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMessageRecord {
    pub session_id: String,
    /// Starts at 1, strictly increasing and gap-free within a session.
    pub sequence_number: u64,
    /// Idempotency key, unique per session.
    pub operation_id: String,
    pub message: Message,
    pub created_at: DateTime<Utc>,
    /// How the turn ended; set on the first record of a committed turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_outcome: Option<TurnOutcome>,
}

impl PersistedMessageRecord {
    pub fn role(&self) -> Role {
        self.message.role()
    }

    pub fn content(&self) -> Option<&str> {
        self.message.text()
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        self.message.tool_calls()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.message.tool_call_id()
    }
}

/// Terminal state of a committed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A message waiting to be committed under its idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub operation_id: String,
    pub message: Message,
}

/// Result of [`SessionStore::commit_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Records written, in order.
    Created(Vec<PersistedMessageRecord>),
    /// The first operation id was already stored; nothing was written. Holds
    /// the records of the stored turn.
    Duplicate(Vec<PersistedMessageRecord>),
}

/// Result of [`SessionStore::append`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Created(PersistedMessageRecord),
    /// The operation id was already stored; nothing was written.
    AlreadyExists(PersistedMessageRecord),
}

impl AppendOutcome {
    pub fn record(&self) -> &PersistedMessageRecord {
        match self {
            Self::Created(record) | Self::AlreadyExists(record) => record,
        }
    }

    pub fn into_record(self) -> PersistedMessageRecord {
        match self {
            Self::Created(record) | Self::AlreadyExists(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// The only writer of session history.
///
/// Implementations must assign sequence numbers without gaps or duplicates
/// even when appends for the same session race.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append `message` unless `operation_id` is already stored for the session.
    async fn append(
        &self,
        session_id: &str,
        message: &Message,
        operation_id: &str,
    ) -> Result<AppendOutcome>;

    /// Append a whole turn as one contiguous block.
    ///
    /// The turn is keyed by its first message: when that operation id is
    /// already stored, nothing is written and the stored turn comes back as
    /// [`CommitOutcome::Duplicate`]. `outcome` is kept on the first record.
    async fn commit_turn(
        &self,
        session_id: &str,
        messages: &[PendingMessage],
        outcome: &TurnOutcome,
    ) -> Result<CommitOutcome>;

    /// Remove every record with `sequence_number > after_sequence`.
    ///
    /// Returns how many records were removed.
    async fn delete_after(&self, session_id: &str, after_sequence: u64) -> Result<u64>;

    /// All records of a session, ordered by sequence number.
    async fn get_history(&self, session_id: &str) -> Result<Vec<PersistedMessageRecord>>;
}

/// Records of the turn whose first message has `operation_id`.
///
/// Runs from that record up to the next user message.
pub fn stored_turn(
    records: &[PersistedMessageRecord],
    operation_id: &str,
) -> Option<Vec<PersistedMessageRecord>> {
    let start = records.iter().position(|r| r.operation_id == operation_id)?;
    let mut turn = vec![records[start].clone()];
    turn.extend(
        records[start + 1..]
            .iter()
            .take_while(|r| r.role() != Role::User)
            .cloned(),
    );
    Some(turn)
}

/// Messages of earlier turns to send back to the model, in order.
///
/// Keeps the last `max_messages` user and assistant messages, starting at a
/// user message. Tool calls without a stored result are stripped, and tool
/// results are kept only for calls of a kept assistant message, so history
/// cut inside a tool round still forms a valid conversation.
pub fn history_messages(records: &[PersistedMessageRecord], max_messages: usize) -> Vec<Message> {
    let conversational: Vec<&PersistedMessageRecord> = records
        .iter()
        .filter(|r| matches!(r.role(), Role::User | Role::Assistant))
        .collect();
    let window = &conversational[conversational.len().saturating_sub(max_messages)..];
    let window = match window.iter().position(|r| r.role() == Role::User) {
        Some(first_user) => &window[first_user..],
        None => &[],
    };
    let Some(first_sequence) = window.first().map(|r| r.sequence_number) else {
        return Vec::new();
    };

    let kept: HashSet<u64> = window.iter().map(|r| r.sequence_number).collect();
    let answered: HashSet<&str> = records
        .iter()
        .filter(|r| r.sequence_number > first_sequence)
        .filter_map(|r| r.tool_call_id())
        .collect();
    let requested: HashSet<&str> = window
        .iter()
        .flat_map(|r| r.tool_calls())
        .map(|call| call.id.as_str())
        .filter(|id| answered.contains(id))
        .collect();

    let mut messages = Vec::new();
    for record in records.iter().filter(|r| r.sequence_number >= first_sequence) {
        match &record.message {
            Message::Tool(tool) => {
                if requested.contains(tool.tool_call_id.as_str()) {
                    messages.push(record.message.clone());
                }
            }
            Message::Assistant {
                content,
                tool_calls,
                reasoning,
            } if kept.contains(&record.sequence_number) => {
                let tool_calls: Vec<ToolCallRequest> = tool_calls
                    .iter()
                    .filter(|call| answered.contains(call.id.as_str()))
                    .cloned()
                    .collect();
                let has_text = content.as_deref().is_some_and(|t| !t.trim().is_empty());
                if has_text || !tool_calls.is_empty() {
                    messages.push(Message::Assistant {
                        content: content.clone(),
                        tool_calls,
                        reasoning: reasoning.clone(),
                    });
                }
            }
            message if kept.contains(&record.sequence_number) => messages.push(message.clone()),
            _ => {}
        }
    }
    messages
}
