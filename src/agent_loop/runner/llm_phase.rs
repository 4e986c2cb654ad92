use std::time::Duration;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::super::events::TurnEventPayload;
use super::control::TurnEventEmitter;
use crate::error::{AgentError, Result};
use crate::provider::{ProviderAdapter, ProviderRequest};
use crate::tools::{FinalizedToolCall, ToolCallAccumulator};
use crate::types::{FinishReason, StreamDelta, Usage};
use crate::util::{next_within, RetryPolicy};

const MAX_OPEN_ATTEMPTS: u32 = 3;

/// Everything one model round produced.
#[derive(Debug, Default)]
pub(super) struct RoundOutput {
    pub(super) text: String,
    pub(super) reasoning: String,
    pub(super) calls: Vec<FinalizedToolCall>,
    pub(super) finish_reason: Option<FinishReason>,
    pub(super) usage: Option<Usage>,
}

pub(super) enum LlmPhaseOutcome {
    Ready(RoundOutput),
    Canceled,
    Failed { reason: String, partial_text: String },
}

pub(super) struct LlmPhase<'a> {
    pub(super) adapter: &'a dyn ProviderAdapter,
    pub(super) emitter: &'a TurnEventEmitter,
    pub(super) cancel: &'a CancellationToken,
    pub(super) idle_timeout: Option<Duration>,
    pub(super) max_retry_delay: Duration,
    pub(super) round: u32,
}

impl LlmPhase<'_> {
    pub(super) async fn run(&self, request: &ProviderRequest) -> LlmPhaseOutcome {
        let mut stream = match self.open(request).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return LlmPhaseOutcome::Canceled,
            Err(err) => {
                tracing::warn!(
                    round = self.round,
                    category = ?err.category(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "failed to open provider stream"
                );
                return LlmPhaseOutcome::Failed {
                    reason: err.to_string(),
                    partial_text: String::new(),
                };
            }
        };

        let mut output = RoundOutput::default();
        let mut accumulator = ToolCallAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LlmPhaseOutcome::Canceled,
                next = next_within(&mut stream, self.idle_timeout) => next,
            };
            let delta = match next {
                Ok(Some(Ok(delta))) => delta,
                // A stream that ends without a terminal delta is treated as done.
                Ok(None) => break,
                Ok(Some(Err(err))) => return self.failed(err, output.text),
                Err(AgentError::Timeout(ms)) => {
                    return self.failed(
                        AgentError::Stream(format!("no data from provider for {ms}ms")),
                        output.text,
                    )
                }
                Err(err) => return self.failed(err, output.text),
            };
            match delta {
                StreamDelta::Text { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    output.text.push_str(&text);
                    self.emitter.emit(TurnEventPayload::AssistantDelta { text });
                }
                StreamDelta::Reasoning { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    output.reasoning.push_str(&text);
                    self.emitter.emit(TurnEventPayload::ReasoningDelta { text });
                }
                StreamDelta::ToolCall(fragment) => {
                    if let Some(started) = accumulator.apply(&fragment) {
                        tracing::debug!(
                            round = self.round,
                            tool_call_id = ?started.id,
                            tool_name = %started.name,
                            "tool call started"
                        );
                        self.emitter.emit(TurnEventPayload::ToolCallStarted {
                            id: started.id,
                            name: started.name,
                        });
                    }
                }
                StreamDelta::Done {
                    finish_reason,
                    usage,
                } => {
                    output.finish_reason = finish_reason;
                    output.usage = usage;
                    break;
                }
                StreamDelta::Error { message } => {
                    return self.failed(AgentError::Stream(message), output.text)
                }
            }
        }

        output.calls = accumulator.finish();
        tracing::debug!(
            round = self.round,
            text_len = output.text.len(),
            tool_calls = output.calls.len(),
            finish_reason = ?output.finish_reason,
            "model round finished"
        );
        LlmPhaseOutcome::Ready(output)
    }

    /// Open the stream, retrying rate limits. `Ok(None)` means canceled.
    async fn open(
        &self,
        request: &ProviderRequest,
    ) -> Result<Option<BoxStream<'static, Result<StreamDelta>>>> {
        let policy = RetryPolicy::new(MAX_OPEN_ATTEMPTS, self.max_retry_delay);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            opened = policy.execute(|| self.adapter.stream_completion(request)) => opened.map(Some),
        }
    }

    fn failed(&self, err: AgentError, partial_text: String) -> LlmPhaseOutcome {
        tracing::warn!(
            round = self.round,
            category = ?err.category(),
            retryable = err.is_retryable(),
            error = %err,
            "provider stream failed"
        );
        LlmPhaseOutcome::Failed {
            reason: err.to_string(),
            partial_text,
        }
    }
}
