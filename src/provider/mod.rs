//! Provider adapter trait and backend implementations.

pub mod format;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{ProviderKind, ProviderSettings};
use crate::error::{AgentError, Result};
use crate::tools::ToolDefinition;
use crate::types::{GenerationSettings, Message, StreamDelta};

/// One round's request, in backend-neutral form.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    /// `None` means the backend must not be offered any tools this round.
    pub tools: Option<Vec<ToolDefinition>>,
    pub settings: GenerationSettings,
}

impl ProviderRequest {
    /// Tools to attach, treating an empty list like no tools.
    pub fn offered_tools(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref().filter(|t| !t.is_empty())
    }
}

/// A streaming backend family.
///
/// Wire formats stay inside each implementation; only [`StreamDelta`]
/// crosses this boundary.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn provider_name(&self) -> &str;

    /// The model this adapter instance talks to.
    fn model_id(&self) -> &str;

    /// Whether this backend can emit tool calls at all.
    ///
    /// When `false` the runner never attaches tool schemas.
    fn supports_tool_calls(&self) -> bool;

    /// Open a streaming completion.
    ///
    /// Errors opening the stream (HTTP status, connect failures) are returned
    /// directly; failures after the stream started are yielded as items.
    async fn stream_completion(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>>;
}

/// Build an adapter from resolved provider settings.
pub fn create_adapter(settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>> {
    match settings.kind {
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => {
            let api_key = settings
                .api_key
                .clone()
                .ok_or_else(|| AgentError::Authentication("Missing ANTHROPIC_API_KEY".into()))?;
            let adapter = anthropic::AnthropicAdapter::new(
                settings.model.clone(),
                api_key,
                settings.base_url.clone(),
            );
            let adapter = match settings.supports_tools {
                Some(false) => adapter.text_only(),
                _ => adapter,
            };
            Ok(Arc::new(adapter))
        }
        #[cfg(feature = "openai")]
        kind @ (ProviderKind::OpenAi
        | ProviderKind::Groq
        | ProviderKind::Xai
        | ProviderKind::DeepSeek
        | ProviderKind::Cerebras
        | ProviderKind::OpenAiCompatible) => {
            let base_url = settings
                .base_url
                .clone()
                .or_else(|| kind.default_base_url().map(str::to_string))
                .ok_or_else(|| {
                    AgentError::Configuration(format!("Missing base URL for provider '{kind}'"))
                })?;
            let api_key = match (settings.api_key.clone(), kind) {
                (Some(key), _) => key,
                // Local servers commonly run without a key.
                (None, ProviderKind::OpenAiCompatible) => String::new(),
                (None, _) => {
                    return Err(AgentError::Authentication(format!(
                        "Missing API key for provider '{kind}'"
                    )))
                }
            };
            let adapter = openai::OpenAiAdapter::new(settings.model.clone(), api_key, base_url)
                .with_provider_name(kind.to_string());
            let adapter = match settings.supports_tools {
                Some(false) => adapter.text_only(),
                _ => adapter,
            };
            Ok(Arc::new(adapter))
        }
        #[allow(unreachable_patterns)]
        other => Err(AgentError::Configuration(format!(
            "Provider '{other}' not enabled via feature flags"
        ))),
    }
}
