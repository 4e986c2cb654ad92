use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::json;

use crate::agent_loop::events::TurnEvent;
use crate::session::MemorySessionStore;
use crate::tools::{CapabilityFn, CapabilityParameters, HandlerError};
use crate::types::{FinishReason, StreamDelta, ToolCallFragment, Usage};

/// What the stub backend does on one call.
pub(super) enum Step {
    /// Yield these items, then end.
    Stream(Vec<Result<StreamDelta>>),
    /// Yield these deltas, then never yield again.
    StreamThenStall(Vec<StreamDelta>),
    /// Fail to open the stream.
    OpenError(AgentError),
}

type Script = Box<dyn Fn(usize) -> Step + Send + Sync>;

pub(super) struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
    supports_tools: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    /// `script` maps the zero-based call number to that call's behavior.
    pub(super) fn new(script: impl Fn(usize) -> Step + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            supports_tools: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn text_only(script: impl Fn(usize) -> Step + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            supports_tools: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        "stub-model"
    }

    fn supports_tool_calls(&self) -> bool {
        self.supports_tools
    }

    async fn stream_completion(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        self.requests.lock().unwrap().push(request.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(call) {
            Step::Stream(items) => Ok(stream::iter(items).boxed()),
            Step::StreamThenStall(deltas) => Ok(stream::iter(deltas.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Step::OpenError(err) => Err(err),
        }
    }
}

fn done(reason: FinishReason) -> StreamDelta {
    StreamDelta::Done {
        finish_reason: Some(reason),
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        }),
    }
}

/// A round that answers with `text`.
pub(super) fn text_round(text: &str) -> Step {
    Step::Stream(vec![Ok(StreamDelta::text(text)), Ok(done(FinishReason::Stop))])
}

/// A round that requests the given `(id, name, arguments)` calls.
pub(super) fn tool_round(calls: &[(&str, &str, &str)]) -> Step {
    Step::Stream(tool_deltas(calls).into_iter().map(Ok).collect())
}

pub(super) fn tool_deltas(calls: &[(&str, &str, &str)]) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    for (index, (id, name, args)) in calls.iter().enumerate() {
        let index = index as u32;
        deltas.push(StreamDelta::ToolCall(
            ToolCallFragment::start(*id, *name).with_index(index),
        ));
        deltas.push(StreamDelta::ToolCall(ToolCallFragment {
            index: Some(index),
            arguments: Some(args.to_string()),
            ..Default::default()
        }));
    }
    deltas.push(done(FinishReason::ToolCalls));
    deltas
}

pub(super) fn empty_round() -> Step {
    Step::Stream(vec![Ok(done(FinishReason::Stop))])
}

/// Registry with `list_items`, `create_item`, `slow_lookup` and `huge_dump`.
pub(super) fn test_registry() -> Arc<CapabilityRegistry> {
    let registry = CapabilityRegistry::new()
        .with(CapabilityFn::new(
            "list_items",
            "List items",
            CapabilityParameters::empty(),
            |_args, _caller| async move { Ok(json!(["a", "b"])) },
        ))
        .with(CapabilityFn::new(
            "create_item",
            "Create an item",
            CapabilityParameters::object()
                .string("title", "Item title", true)
                .build(),
            |args, caller| async move {
                let title = args.get_str("title")?;
                Ok(json!({ "title": title, "owner": caller.subject() }))
            },
        ))
        .with(CapabilityFn::new(
            "slow_lookup",
            "Lookup that takes a while",
            CapabilityParameters::empty(),
            |_args, _caller| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            },
        ))
        .with(CapabilityFn::new(
            "huge_dump",
            "Returns a very large payload",
            CapabilityParameters::empty(),
            |_args, _caller| async move { Ok(serde_json::Value::String("x".repeat(200_000))) },
        ))
        .with(CapabilityFn::new(
            "always_fails",
            "Fails",
            CapabilityParameters::empty(),
            |_args, _caller| async move {
                Err::<serde_json::Value, _>(HandlerError::Failed("backend unavailable".into()))
            },
        ));
    Arc::new(registry)
}

pub(super) struct Harness {
    pub(super) runner: TurnRunner,
    pub(super) provider: Arc<ScriptedProvider>,
    pub(super) store: Arc<MemorySessionStore>,
    pub(super) events: Arc<Mutex<Vec<TurnEvent>>>,
}

impl Harness {
    pub(super) fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self::with_config(provider, AgentConfig::default())
    }

    pub(super) fn with_config(provider: Arc<ScriptedProvider>, config: AgentConfig) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let runner = TurnRunner::new(
            provider.clone(),
            test_registry(),
            store.clone(),
            config,
        )
        .with_event_sink(Arc::new(move |event| {
            sink_events.lock().unwrap().push(event);
        }));
        Self {
            runner,
            provider,
            store,
            events,
        }
    }

    pub(super) async fn run(&self, text: &str) -> TurnResult {
        self.runner
            .run_turn(
                TurnInput::new("session-1", text),
                CallerIdentity::new("user-42"),
                CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    pub(super) fn payloads(&self) -> Vec<TurnEventPayload> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.payload.clone())
            .collect()
    }

    pub(super) async fn history(&self) -> Vec<crate::session::PersistedMessageRecord> {
        self.store.get_history("session-1").await.unwrap()
    }
}
