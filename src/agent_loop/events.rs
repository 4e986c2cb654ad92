//! Turn event stream types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ToolCallRequest;

use super::types::TurnId;

/// Callback receiving turn events in emission order.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Turn lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TurnLifecycle {
    Started,
    Completed,
    Failed { error: String },
    BudgetExceeded,
    Canceled,
}

/// Concrete event payloads emitted by the turn runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    Lifecycle {
        state: TurnLifecycle,
    },
    RoundStarted {
        round: u32,
        tools_offered: bool,
    },
    AssistantDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    /// A streamed tool call received its name.
    ToolCallStarted {
        id: Option<String>,
        name: String,
    },
    AssistantRoundComplete {
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        success: bool,
        truncated: bool,
    },
    /// Tool calls discarded without running (forced round or per-round cap).
    ToolCallsDropped {
        count: usize,
    },
    ToolCallsDeduplicated {
        count: usize,
    },
    SystemNotice {
        message: String,
    },
}

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnEvent {
    pub turn_id: TurnId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}
