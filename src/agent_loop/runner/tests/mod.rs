use super::*;

mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::agent_loop::guard::{CORRECTIVE_DIRECTIVE, FORCED_FINAL_DIRECTIVE};
use crate::types::{Role, StreamDelta};
use support::*;

fn roles(records: &[crate::session::PersistedMessageRecord]) -> Vec<Role> {
    records.iter().map(|r| r.role()).collect()
}

#[tokio::test]
async fn plain_answer_completes_in_one_round() {
    let harness = Harness::new(ScriptedProvider::new(|_| text_round("Hello there")));

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text.as_deref(), Some("Hello there"));
    assert_eq!(result.rounds_used, 0);
    assert_eq!(roles(&result.messages_persisted), vec![Role::User, Role::Assistant]);
    assert_eq!(result.usage.total_tokens, 15);

    let requests = harness.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(5));
}

#[tokio::test]
async fn tool_round_then_forced_text_answer() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "{}")]),
        _ => text_round("You have two items."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("what do I have?").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text.as_deref(), Some("You have two items."));
    assert_eq!(result.rounds_used, 1);
    assert_eq!(
        roles(&result.messages_persisted),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let assistant = &result.messages_persisted[1];
    assert_eq!(assistant.content(), None);
    assert_eq!(assistant.tool_calls()[0].id, "call_1");
    let tool = &result.messages_persisted[2];
    assert_eq!(tool.tool_call_id(), Some("call_1"));
    assert_eq!(tool.content(), Some("[\"a\",\"b\"]"));

    let requests = harness.provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].tools.is_none());
    assert_eq!(
        requests[1].messages.last(),
        Some(&Message::system(FORCED_FINAL_DIRECTIVE))
    );
}

#[tokio::test]
async fn zero_argument_tool_gets_an_empty_object() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "")]),
        _ => text_round("Two items."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("list my items").await;

    assert_eq!(result.status, TurnStatus::Completed);
    let assistant = &result.messages_persisted[1];
    assert_eq!(assistant.tool_calls()[0].arguments, serde_json::json!({}));
    let Message::Tool(tool) = &result.messages_persisted[2].message else {
        panic!("expected tool message");
    };
    assert!(tool.success);
}

#[tokio::test]
async fn two_calls_in_one_round_keep_emission_order() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[
            ("call_a", "create_item", r#"{"title":"milk"}"#),
            ("call_b", "create_item", r#"{"title":"eggs"}"#),
        ]),
        _ => text_round("Created milk and eggs."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("add milk and eggs").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text.as_deref(), Some("Created milk and eggs."));
    assert_eq!(harness.provider.call_count(), 2);

    let history = harness.history().await;
    let tool_ids: Vec<_> = history.iter().filter_map(|r| r.tool_call_id()).collect();
    assert_eq!(tool_ids, vec!["call_a", "call_b"]);
    let titles: Vec<String> = history
        .iter()
        .filter(|r| r.role() == Role::Tool)
        .map(|r| {
            let value: serde_json::Value = serde_json::from_str(r.content().unwrap()).unwrap();
            assert_eq!(value["owner"], "user-42");
            value["title"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(titles, vec!["milk", "eggs"]);
}

#[tokio::test]
async fn relaunch_in_forced_round_is_dropped_and_corrected() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "{}")]),
        1 => tool_round(&[("call_2", "list_items", "{}")]),
        _ => text_round("Done."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("list").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text.as_deref(), Some("Done."));
    assert_eq!(result.rounds_used, 2);
    let tool_messages = result
        .messages_persisted
        .iter()
        .filter(|r| r.role() == Role::Tool)
        .count();
    assert_eq!(tool_messages, 1);

    let requests = harness.provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[2].messages.last(),
        Some(&Message::system(CORRECTIVE_DIRECTIVE))
    );
    assert!(harness
        .payloads()
        .contains(&TurnEventPayload::ToolCallsDropped { count: 1 }));
}

#[tokio::test]
async fn forced_round_text_wins_over_new_calls() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "{}")]),
        _ => {
            let mut deltas = vec![Ok(StreamDelta::text("Two items."))];
            deltas.extend(
                tool_deltas(&[("call_2", "list_items", "{}")])
                    .into_iter()
                    .map(Ok),
            );
            Step::Stream(deltas)
        }
    });
    let harness = Harness::new(provider);

    let result = harness.run("list").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(result.final_text.as_deref(), Some("Two items."));
    assert_eq!(harness.provider.call_count(), 2);
}

#[tokio::test]
async fn empty_forced_round_falls_back_to_summary() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[
            ("call_1", "list_items", "{}"),
            ("call_2", "always_fails", "{}"),
        ]),
        _ => empty_round(),
    });
    let harness = Harness::new(provider);

    let result = harness.run("do things").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(
        result.final_text.as_deref(),
        Some(
            "Here is what was done:\n- list_items: succeeded ([\"a\",\"b\"])\n- always_fails: failed (Error: backend unavailable)"
        )
    );
    let last = result.messages_persisted.last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.content(), result.final_text.as_deref());
}

#[tokio::test]
async fn budget_of_one_round_stops_a_looping_backend() {
    let provider = ScriptedProvider::new(|call| {
        let id = format!("call_{call}");
        tool_round(&[(id.as_str(), "list_items", "{}")])
    });
    let config = AgentConfig::builder().max_rounds(1).build();
    let harness = Harness::with_config(provider, config);

    let result = harness.run("loop forever").await;

    assert_eq!(result.status, TurnStatus::BudgetExceeded);
    assert_eq!(result.rounds_used, 1);
    assert_eq!(harness.provider.call_count(), 1);
    assert!(result.final_text.is_none());
    assert_eq!(
        roles(&result.messages_persisted),
        vec![Role::User, Role::Assistant, Role::Tool]
    );
    let last_event = harness.payloads().pop().unwrap();
    assert_eq!(
        last_event,
        TurnEventPayload::Lifecycle {
            state: TurnLifecycle::BudgetExceeded
        }
    );
}

#[tokio::test]
async fn oversized_tool_result_is_truncated_to_the_cap() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "huge_dump", "{}")]),
        _ => text_round("That was big."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("dump").await;

    let tool = &result.messages_persisted[2];
    let Message::Tool(message) = &tool.message else {
        panic!("expected tool message");
    };
    assert_eq!(message.content.len(), 64 * 1024);
    assert!(message.truncated);
    assert!(message.success);
    assert_eq!(result.status, TurnStatus::Completed);
}

#[tokio::test]
async fn malformed_and_unknown_calls_become_failed_tool_messages() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[
            ("call_1", "create_item", r#"{"title":"#),
            ("call_2", "launch_rocket", "{}"),
        ]),
        _ => text_round("Something went wrong."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("go").await;

    assert_eq!(result.status, TurnStatus::Completed);
    let tools: Vec<_> = result
        .messages_persisted
        .iter()
        .filter_map(|r| match &r.message {
            Message::Tool(tool) => Some(tool.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(tools.len(), 2);
    assert!(!tools[0].success);
    assert!(tools[0].content.starts_with("Error: invalid tool arguments"));
    assert!(!tools[1].success);
    assert_eq!(tools[1].content, "Error: unknown tool 'launch_rocket'");

    // The unparsed arguments are echoed back verbatim.
    let assistant = &result.messages_persisted[1];
    assert_eq!(
        assistant.tool_calls()[0].arguments,
        serde_json::Value::String(r#"{"title":"#.into())
    );
}

#[tokio::test]
async fn stream_error_keeps_partial_text() {
    let provider = ScriptedProvider::new(|_| {
        Step::Stream(vec![
            Ok(StreamDelta::text("Partial ")),
            Ok(StreamDelta::text("answer")),
            Err(AgentError::Stream("connection reset".into())),
        ])
    });
    let harness = Harness::new(provider);

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(roles(&result.messages_persisted), vec![Role::User, Role::Assistant]);
    assert_eq!(result.messages_persisted[1].content(), Some("Partial answer"));
}

#[tokio::test]
async fn error_delta_fails_the_turn() {
    let provider = ScriptedProvider::new(|_| {
        Step::Stream(vec![Ok(StreamDelta::Error {
            message: "overloaded".into(),
        })])
    });
    let harness = Harness::new(provider);

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(roles(&result.messages_persisted), vec![Role::User]);
    assert!(matches!(
        harness.payloads().last(),
        Some(TurnEventPayload::Lifecycle {
            state: TurnLifecycle::Failed { .. }
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_stream_fails_after_idle_timeout() {
    let provider =
        ScriptedProvider::new(|_| Step::StreamThenStall(vec![StreamDelta::text("thinking")]));
    let config = AgentConfig::builder().stream_idle_timeout_ms(1_000).build();
    let harness = Harness::with_config(provider, config);

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("no data from provider"));
    assert_eq!(result.messages_persisted[1].content(), Some("thinking"));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_open_is_retried_after_hint() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => Step::OpenError(AgentError::RateLimited {
            retry_after_ms: Some(500),
        }),
        _ => text_round("ok"),
    });
    let harness = Harness::new(provider);

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(harness.provider.call_count(), 2);
}

#[tokio::test]
async fn rate_limit_without_hint_fails_the_turn() {
    let provider = ScriptedProvider::new(|_| {
        Step::OpenError(AgentError::RateLimited {
            retry_after_ms: None,
        })
    });
    let harness = Harness::new(provider);

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(harness.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_tool_discards_late_result() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "slow_lookup", "{}")]),
        _ => text_round("unreachable"),
    });
    let harness = Harness::new(provider);

    let handle = harness.runner.start_turn(
        TurnInput::new("session-1", "look it up"),
        CallerIdentity::anonymous(),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel_turn(&handle);
    let result = handle.wait().await.unwrap();

    assert_eq!(result.status, TurnStatus::Canceled);
    assert_eq!(roles(&result.messages_persisted), vec![Role::User]);

    // The capability finishes later; nothing new may appear.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(roles(&harness.history().await), vec![Role::User]);
    assert_eq!(harness.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_stream_drops_partial_text() {
    let provider =
        ScriptedProvider::new(|_| Step::StreamThenStall(vec![StreamDelta::text("half a")]));
    let config = AgentConfig::builder().stream_idle_timeout_ms(0).build();
    let harness = Harness::with_config(provider, config);

    let handle = harness
        .runner
        .start_turn(TurnInput::new("session-1", "hi"), CallerIdentity::anonymous());
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert_eq!(result.status, TurnStatus::Canceled);
    assert_eq!(roles(&result.messages_persisted), vec![Role::User]);
}

#[tokio::test]
async fn text_only_backend_never_sees_tools() {
    let provider = ScriptedProvider::text_only(|_| {
        let mut deltas = vec![Ok(StreamDelta::text("I cannot run tools."))];
        deltas.extend(
            tool_deltas(&[("call_1", "list_items", "{}")])
                .into_iter()
                .map(Ok),
        );
        Step::Stream(deltas)
    });
    let harness = Harness::new(provider);

    let result = harness.run("list").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert!(harness.provider.requests()[0].tools.is_none());
    assert_eq!(roles(&result.messages_persisted), vec![Role::User, Role::Assistant]);
    assert!(harness
        .payloads()
        .contains(&TurnEventPayload::ToolCallsDropped { count: 1 }));
}

#[tokio::test]
async fn per_round_limit_drops_excess_calls() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[
            ("call_1", "list_items", "{}"),
            ("call_2", "list_items", "{}"),
            ("call_3", "list_items", "{}"),
        ]),
        _ => text_round("Listed."),
    });
    let config = AgentConfig::builder().max_tool_calls_per_round(2).build();
    let harness = Harness::with_config(provider, config);

    let result = harness.run("list thrice").await;

    let assistant = &result.messages_persisted[1];
    assert_eq!(assistant.tool_calls().len(), 2);
    let tool_count = result
        .messages_persisted
        .iter()
        .filter(|r| r.role() == Role::Tool)
        .count();
    assert_eq!(tool_count, 2);
}

#[tokio::test]
async fn duplicate_submission_replays_stored_turn() {
    let harness = Harness::new(ScriptedProvider::new(|_| text_round("first answer")));
    let input = TurnInput::builder()
        .session_id("session-1")
        .text("hello")
        .operation_id("client-msg-1")
        .build();

    let first = harness
        .runner
        .run_turn(input.clone(), CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();
    let second = harness
        .runner
        .run_turn(input, CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.provider.call_count(), 1);
    assert_eq!(second.final_text.as_deref(), Some("first answer"));
    assert_eq!(second.messages_persisted.len(), first.messages_persisted.len());
    assert_eq!(harness.history().await.len(), 2);
    assert_eq!(first.messages_persisted[0].operation_id, "client-msg-1");
}

#[tokio::test]
async fn later_turns_see_history_and_system_prompt() {
    let provider = ScriptedProvider::new(|call| text_round(&format!("answer {call}")));
    let config = AgentConfig::builder()
        .system_prompt("You manage items.".to_string())
        .build();
    let harness = Harness::with_config(provider, config);

    harness.run("first").await;
    let second = harness.run("second").await;

    let requests = harness.provider.requests();
    assert_eq!(
        requests[1].messages,
        vec![
            Message::system("You manage items."),
            Message::user("first"),
            Message::assistant("answer 0"),
            Message::user("second"),
        ]
    );
    let sequences: Vec<_> = harness
        .history()
        .await
        .iter()
        .map(|r| r.sequence_number)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(second.messages_persisted[0].sequence_number, 3);
}

#[tokio::test]
async fn events_are_ordered_and_bracketed_by_lifecycle() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "{}")]),
        _ => text_round("Done."),
    });
    let harness = Harness::new(provider);

    let result = harness.run("list").await;

    let events = harness.events.lock().unwrap().clone();
    assert!(events.iter().all(|e| e.turn_id == result.turn_id));
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(
        events.first().map(|e| e.payload.clone()),
        Some(TurnEventPayload::Lifecycle {
            state: TurnLifecycle::Started
        })
    );
    assert_eq!(
        events.last().map(|e| e.payload.clone()),
        Some(TurnEventPayload::Lifecycle {
            state: TurnLifecycle::Completed
        })
    );
    let payloads = harness.payloads();
    assert!(payloads.contains(&TurnEventPayload::ToolCallStarted {
        id: Some("call_1".into()),
        name: "list_items".into(),
    }));
    assert!(payloads.contains(&TurnEventPayload::ToolResult {
        tool_call_id: "call_1".into(),
        name: "list_items".into(),
        success: true,
        truncated: false,
    }));
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let harness = Harness::new(ScriptedProvider::new(|_| text_round("unused")));

    let err = harness
        .runner
        .run_turn(
            TurnInput::new("session-1", "   "),
            CallerIdentity::anonymous(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::InvalidArgument(_)));
    assert_eq!(harness.provider.call_count(), 0);
}

fn submission(operation_id: &str) -> TurnInput {
    TurnInput::builder()
        .session_id("session-1")
        .text("look it up")
        .operation_id(operation_id)
        .build()
}

fn replay_notices(harness: &Harness) -> usize {
    harness
        .payloads()
        .iter()
        .filter(|p| {
            **p == TurnEventPayload::SystemNotice {
                message: "duplicate submission replayed from history".into(),
            }
        })
        .count()
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicates_persist_one_turn() {
    let provider = ScriptedProvider::new(|call| match call {
        0 | 1 => {
            let id = format!("call_{call}");
            tool_round(&[(id.as_str(), "slow_lookup", "{}")])
        }
        _ => text_round("Found it."),
    });
    let harness = Harness::new(provider);

    let (first, second) = tokio::join!(
        harness.runner.run_turn(
            submission("client-msg-1"),
            CallerIdentity::anonymous(),
            CancellationToken::new()
        ),
        harness.runner.run_turn(
            submission("client-msg-1"),
            CallerIdentity::anonymous(),
            CancellationToken::new()
        ),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Both runs reached the backend before either committed.
    assert_eq!(harness.provider.call_count(), 4);
    let history = harness.history().await;
    assert_eq!(
        roles(&history),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[0].operation_id, "client-msg-1");
    let operations = |records: &[crate::session::PersistedMessageRecord]| {
        records
            .iter()
            .map(|r| r.operation_id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(operations(&first.messages_persisted), operations(&history));
    assert_eq!(operations(&second.messages_persisted), operations(&history));
    assert_eq!(first.status, TurnStatus::Completed);
    assert_eq!(second.status, TurnStatus::Completed);
    assert_eq!(second.final_text.as_deref(), Some("Found it."));
    assert_eq!(replay_notices(&harness), 1);
}

#[tokio::test]
async fn resubmitting_a_failed_turn_reports_the_failure() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => Step::OpenError(AgentError::api(500, "internal error")),
        _ => text_round("should not run"),
    });
    let harness = Harness::new(provider);

    let first = harness
        .runner
        .run_turn(submission("client-msg-2"), CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();
    let again = harness
        .runner
        .run_turn(submission("client-msg-2"), CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.status, TurnStatus::Failed);
    assert_eq!(again.status, TurnStatus::Failed);
    assert_eq!(again.error, first.error);
    assert!(again.final_text.is_none());
    assert_eq!(harness.provider.call_count(), 1);
    assert!(matches!(
        harness.payloads().last(),
        Some(TurnEventPayload::Lifecycle {
            state: TurnLifecycle::Failed { .. }
        })
    ));
}

#[tokio::test]
async fn resubmitting_an_exhausted_turn_reports_budget_exceeded() {
    let provider = ScriptedProvider::new(|call| {
        let id = format!("call_{call}");
        tool_round(&[(id.as_str(), "list_items", "{}")])
    });
    let config = AgentConfig::builder().max_rounds(1).build();
    let harness = Harness::with_config(provider, config);

    let first = harness
        .runner
        .run_turn(submission("client-msg-3"), CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();
    let again = harness
        .runner
        .run_turn(submission("client-msg-3"), CallerIdentity::anonymous(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.status, TurnStatus::BudgetExceeded);
    assert_eq!(again.status, TurnStatus::BudgetExceeded);
    assert!(again.final_text.is_none());
    assert_eq!(again.messages_persisted.len(), 3);
    assert_eq!(harness.provider.call_count(), 1);
    assert_eq!(
        harness.payloads().pop(),
        Some(TurnEventPayload::Lifecycle {
            state: TurnLifecycle::BudgetExceeded
        })
    );
}

#[tokio::test]
async fn rewind_inside_a_tool_round_leaves_no_dangling_call() {
    let provider = ScriptedProvider::new(|call| match call {
        0 => tool_round(&[("call_1", "list_items", "{}")]),
        1 => text_round("You have two items."),
        _ => text_round("Starting over."),
    });
    let harness = Harness::new(provider);

    harness.run("list").await;
    // Keep the user message and the assistant message that requested call_1.
    let removed = harness.store.delete_after("session-1", 2).await.unwrap();
    assert_eq!(removed, 2);
    harness.run("again").await;

    let requests = harness.provider.requests();
    assert_eq!(
        requests[2].messages,
        vec![Message::user("list"), Message::user("again")]
    );
}

#[tokio::test]
async fn history_window_limits_earlier_turns() {
    let provider = ScriptedProvider::new(|call| text_round(&format!("answer {call}")));
    let config = AgentConfig::builder().max_history_messages(2).build();
    let harness = Harness::with_config(provider, config);

    harness.run("first").await;
    harness.run("second").await;
    harness.run("third").await;

    let requests = harness.provider.requests();
    assert_eq!(
        requests[2].messages,
        vec![
            Message::user("second"),
            Message::assistant("answer 1"),
            Message::user("third"),
        ]
    );
    assert_eq!(harness.history().await.len(), 6);
}

#[tokio::test]
async fn empty_answer_fails_the_turn() {
    let harness = Harness::new(ScriptedProvider::new(|_| empty_round()));

    let result = harness.run("hi").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert!(result.final_text.is_none());
    assert_eq!(result.error.as_deref(), Some("backend returned an empty answer"));
    assert_eq!(roles(&result.messages_persisted), vec![Role::User]);
    assert!(harness.payloads().contains(&TurnEventPayload::SystemNotice {
        message: "the model returned an empty answer".into(),
    }));
}
