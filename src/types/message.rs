//! Conversation messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A message in a conversation.
///
/// Messages are immutable once built; a turn only ever appends new ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// Instructions for the backend. Never persisted by the turn runner.
    System { content: String },
    User { content: String },
    Assistant {
        /// `None` while the assistant only requested tools.
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    Tool(ToolMessage),
}

impl Message {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
            reasoning: None,
        }
    }

    /// Create an assistant message carrying tool calls.
    ///
    /// Empty text is stored as `None`.
    pub fn assistant_with_tools(
        text: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
        reasoning: Option<String>,
    ) -> Self {
        let text = text.into();
        Self::Assistant {
            content: (!text.is_empty()).then_some(text),
            tool_calls,
            reasoning: reasoning.filter(|r| !r.is_empty()),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool(_) => Role::Tool,
        }
    }

    /// Text content, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::Tool(tool) => Some(&tool.content),
        }
    }

    /// Tool calls requested by this message (empty unless assistant).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The tool call this message answers, if it is a tool message.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool(tool) => Some(&tool.tool_call_id),
            _ => None,
        }
    }
}

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
///
/// `arguments` is the normalized JSON object. When the raw fragment could not
/// be parsed it holds the raw text as a JSON string so the request can still
/// be echoed back to the backend verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result of one tool invocation, correlated by `tool_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub success: bool,
    #[serde(default)]
    pub truncated: bool,
}
