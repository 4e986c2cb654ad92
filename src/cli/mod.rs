//! Command-line front end.

pub mod demo;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ProviderKind;

/// Scrivia agent CLI
#[derive(Parser, Debug)]
#[command(name = "scrivia-agent", version, about = "Tool-calling chat turns against an LLM backend")]
pub struct Cli {
    /// Configuration file (defaults to ~/.scrivia/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Session database (defaults to ~/.scrivia/sessions.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one turn and stream the answer
    Chat(ChatArgs),
    /// Print a session's stored messages
    History(HistoryArgs),
    /// Delete every message after a sequence number
    Rewind(RewindArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(short, long)]
    pub session: String,

    /// Backend family (openai, groq, xai, deepseek, cerebras, openai-compatible, anthropic)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    #[arg(short, long)]
    pub model: Option<String>,

    /// Idempotency key for the user message
    #[arg(long)]
    pub operation_id: Option<String>,

    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Offer the built-in `current_time` and `word_count` tools. Without
    /// this flag the turn runs with no tools.
    #[arg(long)]
    pub demo_tools: bool,

    /// User message
    pub text: String,
}

/// Arguments for the `history` subcommand.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(short, long)]
    pub session: String,
}

/// Arguments for the `rewind` subcommand.
#[derive(Args, Debug)]
pub struct RewindArgs {
    #[arg(short, long)]
    pub session: String,

    /// Keep messages up to and including this sequence number
    #[arg(long)]
    pub after: u64,
}

/// Install the global subscriber. `SCRIVIA_LOG` holds the filter, `warn` by default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("SCRIVIA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
