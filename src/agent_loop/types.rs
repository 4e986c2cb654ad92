//! Core turn types.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::session::PersistedMessageRecord;
use crate::types::Usage;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// How a turn ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    /// The backend stream failed.
    Failed,
    /// The round budget ran out; distinct from a stream failure.
    BudgetExceeded,
    Canceled,
}

/// One user input to run as a turn.
#[derive(Debug, Clone, Builder)]
pub struct TurnInput {
    #[builder(into)]
    pub session_id: String,
    #[builder(into)]
    pub text: String,
    /// Caller-supplied idempotency key for the user message. Resubmitting
    /// the same key replays the stored turn instead of running it again.
    #[builder(into)]
    pub operation_id: Option<String>,
}

impl TurnInput {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            operation_id: None,
        }
    }
}

/// Outcome of a turn, including everything it persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub turn_id: TurnId,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub messages_persisted: Vec<PersistedMessageRecord>,
    pub rounds_used: u32,
    #[serde(default)]
    pub usage: Usage,
    pub finished_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}
