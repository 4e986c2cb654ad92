//! Anthropic Messages API streaming adapter.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::types::{FinishReason, Message, StreamDelta, ToolCallFragment, Usage};

use super::http::{anthropic_headers, error_from_response, shared_client, sse_data_stream};
use super::{ProviderAdapter, ProviderRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    model: String,
    api_key: String,
    base_url: String,
    supports_tools: bool,
}

impl AnthropicAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            supports_tools: true,
        }
    }

    pub fn text_only(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    pub(crate) fn build_request_body(&self, request: &ProviderRequest) -> Value {
        // tool_use and tool_result blocks are rejected unless `tools` is sent,
        // so rounds without offered tools carry the tool history as text.
        let structured = self.supports_tools && request.offered_tools().is_some();
        let mut system_parts = Vec::new();
        let mut messages: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        for msg in &request.messages {
            if !matches!(msg, Message::Tool(_)) && !pending_results.is_empty() {
                messages.push(json!({ "role": "user", "content": std::mem::take(&mut pending_results) }));
            }
            match msg {
                Message::System { content } => system_parts.push(content.as_str()),
                Message::User { content } => push_user_text(&mut messages, content),
                Message::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut blocks = Vec::new();
                    if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    for call in tool_calls {
                        if structured {
                            // The API only accepts object input; unparsed arguments go as {}.
                            let input = match &call.arguments {
                                Value::Object(_) => call.arguments.clone(),
                                _ => json!({}),
                            };
                            blocks.push(json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": input,
                            }));
                        } else {
                            blocks.push(json!({
                                "type": "text",
                                "text": format!("Called {} with {}", call.name, call.arguments),
                            }));
                        }
                    }
                    if !blocks.is_empty() {
                        messages.push(json!({ "role": "assistant", "content": blocks }));
                    }
                }
                Message::Tool(tool) if structured => {
                    pending_results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": tool.tool_call_id,
                        "content": tool.content,
                        "is_error": !tool.success,
                    }));
                }
                Message::Tool(tool) => {
                    push_user_text(&mut messages, &format!("Result of {}: {}", tool.name, tool.content));
                }
            }
        }
        if !pending_results.is_empty() {
            messages.push(json!({ "role": "user", "content": pending_results }));
        }

        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(messages));
        body.insert(
            "max_tokens".into(),
            json!(request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert("stream".into(), json!(true));

        if !system_parts.is_empty() {
            body.insert("system".into(), json!(system_parts.join("\n\n")));
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(tools) = request.offered_tools().filter(|_| structured) {
            let defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(defs));
        }

        Value::Object(body)
    }
}

/// Append user text, joining it onto a preceding plain-text user message.
fn push_user_text(messages: &mut Vec<Value>, text: &str) {
    if let Some(last) = messages.last_mut() {
        if last["role"] == "user" {
            if let Some(previous) = last["content"].as_str() {
                last["content"] = Value::String(format!("{previous}\n\n{text}"));
                return;
            }
        }
    }
    messages.push(json!({ "role": "user", "content": text }));
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn supports_tool_calls(&self) -> bool {
        self.supports_tools
    }

    async fn stream_completion(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, "opening Anthropic message stream");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let mut data = sse_data_stream(resp);
        let stream = async_stream::stream! {
            let mut usage = Usage::default();
            let mut finish_reason = None;

            while let Some(item) = data.next().await {
                let payload = match item {
                    Ok(payload) => payload,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };
                let event = match serde_json::from_str::<MessagesEvent>(&payload) {
                    Ok(event) => event,
                    Err(err) => {
                        debug!(error = %err, "skipping unrecognized Anthropic event");
                        continue;
                    }
                };
                match event {
                    MessagesEvent::MessageStart { message } => {
                        if let Some(u) = message.usage {
                            usage.input_tokens = u.input_tokens;
                            usage.output_tokens = u.output_tokens;
                        }
                    }
                    MessagesEvent::ContentBlockStart { index, content_block } => {
                        if let ContentBlock::ToolUse { id, name } = content_block {
                            yield Ok(StreamDelta::ToolCall(ToolCallFragment {
                                index: Some(index),
                                id: Some(id),
                                name: Some(name),
                                arguments: None,
                            }));
                        }
                    }
                    MessagesEvent::ContentBlockDelta { index, delta } => match delta {
                        BlockDelta::TextDelta { text } => {
                            yield Ok(StreamDelta::Text { text });
                        }
                        BlockDelta::ThinkingDelta { thinking } => {
                            yield Ok(StreamDelta::Reasoning { text: thinking });
                        }
                        BlockDelta::InputJsonDelta { partial_json } => {
                            yield Ok(StreamDelta::ToolCall(ToolCallFragment {
                                index: Some(index),
                                arguments: Some(partial_json),
                                ..Default::default()
                            }));
                        }
                        BlockDelta::Other => {}
                    },
                    MessagesEvent::MessageDelta { delta, usage: delta_usage } => {
                        if let Some(reason) = delta.stop_reason.as_deref() {
                            finish_reason = FinishReason::from_wire(reason);
                        }
                        if let Some(u) = delta_usage {
                            usage.output_tokens = u.output_tokens;
                        }
                    }
                    MessagesEvent::MessageStop => break,
                    MessagesEvent::Error { error } => {
                        yield Ok(StreamDelta::Error { message: error.message });
                        return;
                    }
                    MessagesEvent::Other => {}
                }
            }

            usage.total_tokens = usage.input_tokens + usage.output_tokens;
            yield Ok(StreamDelta::Done { finish_reason, usage: Some(usage) });
        };

        Ok(Box::pin(stream))
    }
}

// Wire types (internal)

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        usage: Option<WireUsage>,
    },
    MessageStop,
    Error {
        error: WireError,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StartMessage {
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
}
