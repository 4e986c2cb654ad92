//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    TurnEvent, TurnEventPayload, TurnHandle, TurnInput, TurnResult, TurnRunner, TurnStatus,
};
pub use crate::config::{AgentConfig, ConfigFile, ProviderKind, ProviderSettings};
pub use crate::error::{AgentError, Result};
pub use crate::provider::{create_adapter, ProviderAdapter};
pub use crate::session::{MemorySessionStore, SessionStore};
pub use crate::tools::{
    CallerIdentity, Capability, CapabilityFn, CapabilityParameters, CapabilityRegistry,
    HandlerError, ToolArguments,
};
pub use crate::types::{GenerationSettings, Message, Role, Usage};
