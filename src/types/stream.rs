//! Streaming types.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::usage::Usage;

/// One incremental event produced by a provider adapter.
///
/// This is the only shape that crosses the adapter boundary; wire formats
/// stay inside each adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    /// Incremental assistant text.
    Text { text: String },
    /// Incremental reasoning trace.
    Reasoning { text: String },
    /// A piece of a tool call being built.
    ToolCall(ToolCallFragment),
    /// The stream finished normally.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// The backend reported an error inside the stream.
    Error { message: String },
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn done() -> Self {
        Self::Done {
            finish_reason: Some(FinishReason::Stop),
            usage: None,
        }
    }
}

/// A partial tool call as emitted by a backend.
///
/// Backends differ in what they repeat: some send `id` and `name` once and
/// then only argument pieces keyed by `index`, others repeat the id on every
/// fragment, some never send an id at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFragment {
    /// Position of the call inside the response, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument text to append to the call's buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// A fragment that opens a call with its id and name.
    pub fn start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A fragment carrying only argument text for the given call id.
    pub fn args(id: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            arguments: Some(arguments.into()),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// True when the fragment carries nothing that could affect a call.
    pub fn is_empty(&self) -> bool {
        self.id.as_deref().map_or(true, str::is_empty)
            && self.name.as_deref().map_or(true, str::is_empty)
            && self.arguments.as_deref().map_or(true, str::is_empty)
    }
}
