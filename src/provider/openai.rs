//! OpenAI-compatible Chat Completions streaming adapter.
//!
//! Serves OpenAI itself and every backend that speaks the same dialect
//! (Groq, xAI, DeepSeek, Cerebras, local servers) through `base_url`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::types::{FinishReason, Message, StreamDelta, ToolCallFragment, Usage};

use super::format::arguments_to_wire;
use super::http::{bearer_headers, error_from_response, shared_client, sse_data_stream};
use super::{ProviderAdapter, ProviderRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for `/chat/completions` with `stream: true`.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    provider_name: String,
    model: String,
    api_key: String,
    base_url: String,
    supports_tools: bool,
}

impl OpenAiAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_name: "openai".to_string(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            supports_tools: true,
        }
    }

    /// Report a different provider name (e.g. "groq") in logs and events.
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Mark this backend as unable to call tools.
    pub fn text_only(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    pub(crate) fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| message_to_openai(m, self.supports_tools))
            .collect();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("stream".into(), json!(true));

        if let Some(max) = request.settings.max_tokens {
            body.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }

        if let Some(tools) = request.offered_tools().filter(|_| self.supports_tools) {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tool_defs));
            body.insert("tool_choice".into(), json!("auto"));
        }

        Value::Object(body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        &self.provider_name
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
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            provider = %self.provider_name,
            model = %self.model,
            tools = request.offered_tools().map_or(0, <[_]>::len),
            "opening chat completion stream"
        );

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let mut data = sse_data_stream(resp);
        let stream = async_stream::stream! {
            let mut finish_reason = None;
            let mut usage = None;

            while let Some(item) = data.next().await {
                let payload = match item {
                    Ok(payload) => payload,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };
                let chunk = match serde_json::from_str::<ChatStreamChunk>(&payload) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        debug!(error = %err, "skipping unparseable stream chunk");
                        continue;
                    }
                };
                if let Some(error) = chunk.error {
                    yield Ok(StreamDelta::Error { message: error.message() });
                    return;
                }
                if let Some(u) = chunk.usage {
                    usage = Some(u.into());
                }
                for choice in chunk.choices {
                    for delta in choice.delta.into_deltas() {
                        yield Ok(delta);
                    }
                    if let Some(reason) = choice.finish_reason.as_deref() {
                        finish_reason = FinishReason::from_wire(reason);
                    }
                }
            }

            yield Ok(StreamDelta::Done { finish_reason, usage });
        };

        Ok(Box::pin(stream))
    }
}

fn message_to_openai(msg: &Message, tools_enabled: bool) -> Value {
    match msg {
        Message::System { content } => json!({ "role": "system", "content": content }),
        Message::User { content } => json!({ "role": "user", "content": content }),
        Message::Assistant {
            content,
            tool_calls,
            ..
        } => {
            if tool_calls.is_empty() || !tools_enabled {
                return json!({ "role": "assistant", "content": content.as_deref().unwrap_or_default() });
            }
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": arguments_to_wire(&tc.arguments),
                        }
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Message::Tool(tool) if tools_enabled => json!({
            "role": "tool",
            "tool_call_id": tool.tool_call_id,
            "name": tool.name,
            "content": tool.content,
        }),
        Message::Tool(tool) => json!({
            "role": "user",
            "content": format!("Result of {}: {}", tool.name, tool.content),
        }),
    }
}

// Wire types (internal)

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
    error: Option<ChatError>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
    #[serde(alias = "reasoning_content")]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCallDelta>,
}

impl ChatDelta {
    fn into_deltas(self) -> Vec<StreamDelta> {
        let mut out = Vec::new();
        if let Some(text) = self.reasoning.filter(|t| !t.is_empty()) {
            out.push(StreamDelta::Reasoning { text });
        }
        if let Some(text) = self.content.filter(|t| !t.is_empty()) {
            out.push(StreamDelta::Text { text });
        }
        for call in self.tool_calls {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            out.push(StreamDelta::ToolCall(ToolCallFragment {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }
        out
    }
}

#[derive(Deserialize)]
struct ChatToolCallDelta {
    index: Option<u32>,
    id: Option<String>,
    function: Option<ChatFunctionDelta>,
}

#[derive(Deserialize)]
struct ChatFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatError {
    Detailed { message: String },
    Plain(String),
}

impl ChatError {
    fn message(self) -> String {
        match self {
            Self::Detailed { message } | Self::Plain(message) => message,
        }
    }
}
