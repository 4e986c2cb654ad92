//! scrivia-agent binary entry point.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use scrivia_agent::agent_loop::{TurnEvent, TurnEventPayload, TurnInput, TurnRunner, TurnStatus};
use scrivia_agent::cli::demo::demo_registry;
use scrivia_agent::cli::{init_tracing, ChatArgs, Cli, Commands, HistoryArgs, RewindArgs};
use scrivia_agent::config::{default_data_dir, ConfigFile};
use scrivia_agent::error::{AgentError, RecoverySuggestion, Result};
use scrivia_agent::provider::create_adapter;
use scrivia_agent::session::{SessionStore, SqliteSessionStore};
use scrivia_agent::tools::{CallerIdentity, CapabilityRegistry};
use scrivia_agent::types::Message;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(cli.config.as_deref(), cli.db.as_deref(), args).await,
        Commands::History(args) => handle_history(cli.db.as_deref(), args).await,
        Commands::Rewind(args) => handle_rewind(cli.db.as_deref(), args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let suggestion = e.recovery_suggestion();
        if suggestion != RecoverySuggestion::ContactSupport {
            eprintln!("Hint: {}", suggestion.hint());
        }
        std::process::exit(1);
    }
}

fn open_store(db: Option<&Path>) -> Result<Arc<SqliteSessionStore>> {
    let path = db
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_data_dir().join("sessions.db"));
    Ok(Arc::new(SqliteSessionStore::open(path)?))
}

async fn handle_chat(config_path: Option<&Path>, db: Option<&Path>, args: ChatArgs) -> Result<()> {
    let mut config = ConfigFile::resolve(config_path)?;
    if let Some(kind) = args.provider {
        config.provider.kind = kind;
    }
    if let Some(model) = args.model {
        config.provider.model = model;
    }
    if let Some(max_rounds) = args.max_rounds {
        config.agent.max_rounds = max_rounds;
        config.agent.validate()?;
    }

    let adapter = create_adapter(&config.provider)?;
    let store = open_store(db)?;
    let registry = if args.demo_tools {
        demo_registry()
    } else {
        CapabilityRegistry::new()
    };
    let runner = TurnRunner::new(
        adapter,
        Arc::new(registry),
        store,
        config.agent,
    )
    .with_event_sink(Arc::new(print_event));

    let input = TurnInput {
        session_id: args.session,
        text: args.text,
        operation_id: args.operation_id,
    };
    let handle = runner.start_turn(input, CallerIdentity::anonymous());
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = handle.wait().await?;
    println!();
    match result.status {
        TurnStatus::Completed => Ok(()),
        TurnStatus::Canceled => {
            eprintln!("turn canceled");
            Ok(())
        }
        TurnStatus::BudgetExceeded | TurnStatus::Failed => Err(AgentError::InvalidState(format!(
            "turn {}: {}",
            result.status,
            result.error.unwrap_or_default()
        ))),
    }
}

fn print_event(event: TurnEvent) {
    match event.payload {
        TurnEventPayload::AssistantDelta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        TurnEventPayload::ToolCallStarted { id, name } => {
            eprintln!("\n[tool] {name} ({})", id.unwrap_or_default());
        }
        TurnEventPayload::ToolResult {
            name,
            success,
            truncated,
            ..
        } => {
            let outcome = if success { "ok" } else { "failed" };
            let note = if truncated { ", truncated" } else { "" };
            eprintln!("[tool] {name}: {outcome}{note}");
        }
        TurnEventPayload::SystemNotice { message } => eprintln!("[notice] {message}"),
        _ => {}
    }
}

async fn handle_history(db: Option<&Path>, args: HistoryArgs) -> Result<()> {
    let store = open_store(db)?;
    for record in store.get_history(&args.session).await? {
        let body = match &record.message {
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => tool_calls
                .iter()
                .map(|call| format!("{}({})", call.name, call.arguments))
                .collect::<Vec<_>>()
                .join(", "),
            message => message.text().unwrap_or_default().to_string(),
        };
        println!("{:>4} [{}] {body}", record.sequence_number, record.role());
    }
    Ok(())
}

async fn handle_rewind(db: Option<&Path>, args: RewindArgs) -> Result<()> {
    let store = open_store(db)?;
    let removed = store.delete_after(&args.session, args.after).await?;
    println!("removed {removed} message(s) after #{}", args.after);
    Ok(())
}
