//! Turn runner: alternates model rounds and tool execution until the
//! backend answers in text, the stream fails, or the round budget runs out.

mod control;
mod llm_phase;
mod persist;
mod tool_phase;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::events::{TurnEventPayload, TurnEventSink, TurnLifecycle};
use super::guard::{RelaunchGuard, RoundBudget};
use super::types::{TurnId, TurnInput, TurnResult, TurnStatus};
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::provider::{ProviderAdapter, ProviderRequest};
use crate::session::{
    history_messages, stored_turn, CommitOutcome, PersistedMessageRecord, SessionStore,
    TurnOutcome,
};
use crate::tools::{CallerIdentity, CapabilityRegistry, FinalizedToolCall, ToolDispatcher};
use crate::types::{Message, ToolCallRequest, ToolMessage, Usage};

use control::TurnEventEmitter;
use llm_phase::{LlmPhase, LlmPhaseOutcome, RoundOutput};
use tool_phase::{run_tool_phase, screen_calls, summarize_results, ToolPhaseOutcome};

/// Drives turns for one backend, one capability registry and one store.
///
/// Cheap to clone; every turn gets its own state.
#[derive(Clone)]
pub struct TurnRunner {
    adapter: Arc<dyn ProviderAdapter>,
    dispatcher: ToolDispatcher,
    store: Arc<dyn SessionStore>,
    config: AgentConfig,
    event_sink: Option<TurnEventSink>,
}

impl TurnRunner {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        registry: Arc<CapabilityRegistry>,
        store: Arc<dyn SessionStore>,
        config: AgentConfig,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry)
            .with_truncation_cap(config.truncation_cap)
            .with_max_parallel(config.max_parallel_tools);
        Self {
            adapter,
            dispatcher,
            store,
            config,
            event_sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a turn in the background.
    pub fn start_turn(&self, input: TurnInput, caller: CallerIdentity) -> TurnHandle {
        let turn_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let runner = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { runner.execute(turn_id, input, caller, token).await });
        TurnHandle {
            turn_id,
            cancel,
            join,
        }
    }

    /// Run a turn on the current task.
    pub async fn run_turn(
        &self,
        input: TurnInput,
        caller: CallerIdentity,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        self.execute(Uuid::new_v4(), input, caller, cancel).await
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        input: TurnInput,
        caller: CallerIdentity,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        let span = tracing::info_span!("turn", %turn_id, session_id = %input.session_id);
        self.execute_inner(turn_id, input, caller, cancel)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        turn_id: TurnId,
        input: TurnInput,
        caller: CallerIdentity,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        if input.session_id.trim().is_empty() {
            return Err(AgentError::InvalidArgument("session id is empty".into()));
        }
        if input.text.trim().is_empty() {
            return Err(AgentError::InvalidArgument("user message is empty".into()));
        }

        let emitter = TurnEventEmitter::new(turn_id, self.event_sink.clone());
        emitter.lifecycle(TurnLifecycle::Started);

        let history = self.store.get_history(&input.session_id).await?;
        let user_operation_id = input
            .operation_id
            .clone()
            .unwrap_or_else(|| persist::operation_id(turn_id, 0));

        if let Some(records) = stored_turn(&history, &user_operation_id) {
            tracing::info!(operation_id = %user_operation_id, "duplicate submission, replaying stored turn");
            return Ok(replayed(turn_id, records, Usage::default(), &emitter));
        }

        let mut context = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = self.config.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            context.push(Message::system(prompt));
        }
        context.extend(history_messages(&history, self.config.max_history_messages));
        let user_message = Message::user(input.text.as_str());
        context.push(user_message.clone());

        let mut turn = TurnState {
            context,
            messages: vec![user_message],
            executed: Vec::new(),
            final_text: None,
            usage: Usage::default(),
        };
        let mut budget = RoundBudget::new(self.config.max_rounds);
        let (status, error) = self
            .run_rounds(&mut turn, &mut budget, &caller, &cancel, &emitter)
            .await;

        let outcome = TurnOutcome {
            status,
            error: error.clone(),
        };
        let pending = persist::pending_messages(
            turn_id,
            &user_operation_id,
            std::mem::take(&mut turn.messages),
        );
        let messages_persisted = match self
            .store
            .commit_turn(&input.session_id, &pending, &outcome)
            .await?
        {
            CommitOutcome::Created(records) => records,
            CommitOutcome::Duplicate(records) => {
                tracing::warn!(
                    operation_id = %user_operation_id,
                    "turn committed meanwhile by a duplicate submission, discarding this run"
                );
                return Ok(replayed(turn_id, records, turn.usage, &emitter));
            }
        };

        emitter.finished(status, error.as_deref());
        tracing::info!(
            %status,
            rounds_used = budget.rounds_used(),
            persisted = messages_persisted.len(),
            "turn finished"
        );
        Ok(TurnResult {
            turn_id,
            status,
            final_text: turn.final_text,
            error,
            messages_persisted,
            rounds_used: budget.rounds_used(),
            usage: turn.usage,
            finished_at: Utc::now(),
        })
    }

    async fn run_rounds(
        &self,
        turn: &mut TurnState,
        budget: &mut RoundBudget,
        caller: &CallerIdentity,
        cancel: &CancellationToken,
        emitter: &TurnEventEmitter,
    ) -> (TurnStatus, Option<String>) {
        let mut guard = RelaunchGuard::new();
        let definitions = self.dispatcher.registry().definitions();
        let tools_supported = self.adapter.supports_tool_calls() && !definitions.is_empty();

        loop {
            if budget.is_exhausted() {
                tracing::warn!(max_rounds = budget.max_rounds(), "round budget exhausted");
                return (
                    TurnStatus::BudgetExceeded,
                    Some(format!(
                        "round budget of {} exhausted",
                        budget.max_rounds()
                    )),
                );
            }
            let round = budget.rounds_used() + 1;
            let offer_tools = tools_supported && guard.tools_allowed();

            let mut messages = turn.context.clone();
            if let Some(directive) = guard.directive() {
                messages.push(Message::system(directive));
                emitter.notice(directive);
            }
            let request = ProviderRequest {
                messages,
                tools: offer_tools.then(|| definitions.clone()),
                settings: self.config.generation.clone(),
            };
            tracing::debug!(round, tools_offered = offer_tools, state = ?guard.state(), "starting round");
            emitter.emit(TurnEventPayload::RoundStarted {
                round,
                tools_offered: offer_tools,
            });

            let phase = LlmPhase {
                adapter: self.adapter.as_ref(),
                emitter,
                cancel,
                idle_timeout: self.config.stream_idle_timeout(),
                max_retry_delay: self.config.max_retry_delay(),
                round,
            };
            let output = match phase.run(&request).await {
                LlmPhaseOutcome::Ready(output) => output,
                LlmPhaseOutcome::Canceled => return (TurnStatus::Canceled, None),
                LlmPhaseOutcome::Failed {
                    reason,
                    partial_text,
                } => {
                    if !partial_text.trim().is_empty() {
                        turn.messages.push(Message::assistant(partial_text));
                    }
                    return (TurnStatus::Failed, Some(reason));
                }
            };
            let RoundOutput {
                text,
                reasoning,
                calls,
                usage,
                ..
            } = output;
            if let Some(usage) = &usage {
                turn.usage.merge(usage);
            }

            let calls = if tools_supported {
                screen_calls(calls, self.config.max_tool_calls_per_round, emitter, round)
            } else {
                ignore_unsupported_calls(calls, emitter, round)
            };
            let (calls, dropped) = guard.admit(calls);
            if dropped > 0 {
                tracing::warn!(round, count = dropped, "tool calls after tool execution dropped");
                emitter.emit(TurnEventPayload::ToolCallsDropped { count: dropped });
            }

            if calls.is_empty() {
                if !text.trim().is_empty() {
                    let message = Message::Assistant {
                        content: Some(text.clone()),
                        tool_calls: Vec::new(),
                        reasoning: Some(reasoning).filter(|r| !r.is_empty()),
                    };
                    emit_round_complete(emitter, &message);
                    turn.messages.push(message);
                    turn.final_text = Some(text);
                    guard.on_text_answer();
                    return (TurnStatus::Completed, None);
                }
                if dropped > 0 {
                    // Corrective round: the next request carries the corrective directive.
                    budget.consume();
                    continue;
                }
                if !turn.executed.is_empty() {
                    tracing::warn!(round, "empty answer after tool execution, summarizing results");
                    let summary = summarize_results(&turn.executed);
                    let message = Message::assistant(summary.clone());
                    emit_round_complete(emitter, &message);
                    turn.messages.push(message);
                    turn.final_text = Some(summary);
                    return (TurnStatus::Completed, None);
                }
                tracing::warn!(round, "backend returned an empty answer");
                emitter.notice("the model returned an empty answer");
                return (
                    TurnStatus::Failed,
                    Some("backend returned an empty answer".to_string()),
                );
            }

            let requests: Vec<ToolCallRequest> = calls.iter().map(FinalizedToolCall::request).collect();
            let assistant = Message::assistant_with_tools(
                text,
                requests,
                Some(reasoning),
            );
            emit_round_complete(emitter, &assistant);

            let results = match run_tool_phase(&self.dispatcher, calls, caller, cancel, emitter).await {
                ToolPhaseOutcome::Executed(results) => results,
                ToolPhaseOutcome::Canceled => return (TurnStatus::Canceled, None),
            };
            turn.push(assistant);
            for result in &results {
                turn.push(Message::Tool(result.clone()));
            }
            turn.executed.extend(results);
            budget.consume();
            guard.on_tools_executed();
        }
    }
}

struct TurnState {
    /// Everything sent to the backend, including history and system prompt.
    context: Vec<Message>,
    /// Messages this turn will persist, starting with the user message.
    messages: Vec<Message>,
    executed: Vec<ToolMessage>,
    final_text: Option<String>,
    usage: Usage,
}

impl TurnState {
    fn push(&mut self, message: Message) {
        self.context.push(message.clone());
        self.messages.push(message);
    }
}

/// Result for a turn already stored under the same user operation id.
fn replayed(
    turn_id: TurnId,
    records: Vec<PersistedMessageRecord>,
    usage: Usage,
    emitter: &TurnEventEmitter,
) -> TurnResult {
    let TurnOutcome { status, error } = persist::stored_outcome(&records);
    emitter.notice("duplicate submission replayed from history");
    emitter.finished(status, error.as_deref());
    let final_text = match status {
        TurnStatus::Completed => persist::final_text(&records),
        _ => None,
    };
    TurnResult {
        turn_id,
        status,
        final_text,
        error,
        messages_persisted: records,
        rounds_used: 0,
        usage,
        finished_at: Utc::now(),
    }
}

fn emit_round_complete(emitter: &TurnEventEmitter, message: &Message) {
    emitter.emit(TurnEventPayload::AssistantRoundComplete {
        content: message.text().map(str::to_string),
        tool_calls: message.tool_calls().to_vec(),
    });
}

fn ignore_unsupported_calls(
    calls: Vec<FinalizedToolCall>,
    emitter: &TurnEventEmitter,
    round: u32,
) -> Vec<FinalizedToolCall> {
    if !calls.is_empty() {
        tracing::warn!(round, count = calls.len(), "tool calls from a backend without tool support dropped");
        emitter.emit(TurnEventPayload::ToolCallsDropped { count: calls.len() });
    }
    Vec::new()
}

/// Handle to a turn running in the background.
pub struct TurnHandle {
    turn_id: TurnId,
    cancel: CancellationToken,
    join: JoinHandle<Result<TurnResult>>,
}

impl TurnHandle {
    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// Request cancellation. Finalized messages are still persisted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the turn to finish.
    pub async fn wait(self) -> Result<TurnResult> {
        self.join
            .await
            .map_err(|err| AgentError::InvalidState(format!("turn task failed: {err}")))?
    }
}

/// Cancel a running turn.
pub fn cancel_turn(handle: &TurnHandle) {
    handle.cancel();
}
