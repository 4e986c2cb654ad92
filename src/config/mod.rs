//! Configuration (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{AgentError, Result};
use crate::types::GenerationSettings;

pub const DEFAULT_MAX_ROUNDS: u32 = 8;
pub const DEFAULT_TRUNCATION_CAP: usize = crate::tools::DEFAULT_TRUNCATION_CAP;
pub const DEFAULT_MAX_TOOL_CALLS_PER_ROUND: usize = 12;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 10_000;
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 30;

/// Knobs for the turn runner.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model rounds allowed per turn.
    #[builder(default = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: u32,
    /// Maximum bytes of a tool result fed back to the model.
    #[builder(default = DEFAULT_TRUNCATION_CAP)]
    pub truncation_cap: usize,
    /// Concurrent capability invocations per round; unbounded when unset.
    pub max_parallel_tools: Option<usize>,
    /// Tool calls accepted from a single round; the rest are dropped.
    #[builder(default = DEFAULT_MAX_TOOL_CALLS_PER_ROUND)]
    pub max_tool_calls_per_round: usize,
    /// Fail the round when the stream is silent this long. `0` disables.
    #[builder(default = DEFAULT_STREAM_IDLE_TIMEOUT_MS)]
    pub stream_idle_timeout_ms: u64,
    /// Longest server-requested rate-limit delay honored before failing.
    #[builder(default = DEFAULT_MAX_RETRY_DELAY_MS)]
    pub max_retry_delay_ms: u64,
    /// User and assistant messages of earlier turns sent back to the model.
    #[builder(default = DEFAULT_MAX_HISTORY_MESSAGES)]
    pub max_history_messages: usize,
    /// Prepended to every request; never persisted.
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub generation: GenerationSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AgentConfig {
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_ms > 0).then(|| Duration::from_millis(self.stream_idle_timeout_ms))
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Override fields from `SCRIVIA_*` variables found by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("SCRIVIA_MAX_ROUNDS") {
            self.max_rounds = parse_env("SCRIVIA_MAX_ROUNDS", &v)?;
        }
        if let Some(v) = lookup("SCRIVIA_TRUNCATION_CAP") {
            self.truncation_cap = parse_env("SCRIVIA_TRUNCATION_CAP", &v)?;
        }
        if let Some(v) = lookup("SCRIVIA_MAX_PARALLEL_TOOLS") {
            let n: usize = parse_env("SCRIVIA_MAX_PARALLEL_TOOLS", &v)?;
            self.max_parallel_tools = (n > 0).then_some(n);
        }
        if let Some(v) = lookup("SCRIVIA_MAX_TOOL_CALLS_PER_ROUND") {
            self.max_tool_calls_per_round = parse_env("SCRIVIA_MAX_TOOL_CALLS_PER_ROUND", &v)?;
        }
        if let Some(v) = lookup("SCRIVIA_STREAM_IDLE_TIMEOUT_MS") {
            self.stream_idle_timeout_ms = parse_env("SCRIVIA_STREAM_IDLE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SCRIVIA_MAX_HISTORY_MESSAGES") {
            self.max_history_messages = parse_env("SCRIVIA_MAX_HISTORY_MESSAGES", &v)?;
        }
        if let Some(v) = lookup("SCRIVIA_SYSTEM_PROMPT") {
            self.system_prompt = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(AgentError::Configuration("max_rounds must be at least 1".into()));
        }
        if self.max_tool_calls_per_round == 0 {
            return Err(AgentError::Configuration(
                "max_tool_calls_per_round must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Configuration(format!("{name}: invalid value '{value}'")))
}

/// Backend families the factory can build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, Default)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    Xai,
    #[strum(serialize = "deepseek")]
    #[serde(rename = "deepseek")]
    DeepSeek,
    Cerebras,
    #[strum(serialize = "openai-compatible")]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    Anthropic,
}

impl ProviderKind {
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Xai => Some("https://api.x.ai/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com"),
            Self::Cerebras => Some("https://api.cerebras.ai/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::OpenAiCompatible => None,
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Groq => "GROQ",
            Self::Xai => "XAI",
            Self::DeepSeek => "DEEPSEEK",
            Self::Cerebras => "CEREBRAS",
            Self::OpenAiCompatible => "OPENAI_COMPAT",
            Self::Anthropic => "ANTHROPIC",
        }
    }
}

/// Which backend to talk to and how.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Force tool support on or off regardless of the family default.
    pub supports_tools: Option<bool>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("supports_tools", &self.supports_tools)
            .finish()
    }
}

impl ProviderSettings {
    /// Fill unset fields from `SCRIVIA_PROVIDER`, `SCRIVIA_MODEL` and the
    /// family's `<PREFIX>_API_KEY` / `<PREFIX>_BASE_URL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(kind) = lookup("SCRIVIA_PROVIDER") {
            self.kind = kind.trim().parse().map_err(|_| {
                AgentError::Configuration(format!("SCRIVIA_PROVIDER: unknown provider '{kind}'"))
            })?;
        }
        if let Some(model) = lookup("SCRIVIA_MODEL") {
            self.model = model;
        }
        let prefix = self.kind.env_prefix();
        if let Some(key) = lookup(&format!("{prefix}_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup(&format!("{prefix}_BASE_URL")) {
            self.base_url = Some(url);
        }
        Ok(())
    }
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub agent: AgentConfig,
    pub provider: ProviderSettings,
}

impl ConfigFile {
    /// Read a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        toml::from_str(&raw).map_err(|e| {
            AgentError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    /// Defaults, then the file at `path` (or the default location), then
    /// `.env` and process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::load(&path)?;
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        config.agent.apply_env(lookup)?;
        config.provider.apply_env(lookup)?;
        config.agent.validate()?;
        Ok(config)
    }
}

/// `~/.scrivia`, or `.scrivia` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".scrivia"))
        .unwrap_or_else(|| PathBuf::from(".scrivia"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
