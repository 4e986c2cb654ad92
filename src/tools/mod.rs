//! Capabilities, tool-call reassembly and dispatch.

pub mod accumulator;
pub mod arguments;
pub mod capability;
pub mod dispatcher;
pub mod registry;
pub mod types;

pub use accumulator::{CallStarted, FinalizedToolCall, ToolCallAccumulator};
pub use arguments::{normalize_arguments, ArgumentParseError, ToolArguments};
pub use capability::{CallerIdentity, Capability, CapabilityFn, HandlerError};
pub use dispatcher::{truncate_result, ToolDispatcher, DEFAULT_TRUNCATION_CAP};
pub use registry::CapabilityRegistry;
pub use types::{CapabilityParameters, ParameterBuilder, ToolDefinition};
