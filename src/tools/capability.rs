//! Capability trait, closure-based wrapper, and caller identity.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::arguments::ToolArguments;
use super::types::{CapabilityParameters, ToolDefinition};

/// Failure reported by a capability handler.
///
/// Always localized to one tool message; never fails the turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Already-validated identity of whoever started the turn.
///
/// Passed through to capabilities unchanged; nothing here authenticates.
#[derive(Clone, Default)]
pub struct CallerIdentity {
    subject: String,
    credential: Option<String>,
}

impl CallerIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            credential: None,
        }
    }

    /// Attach an opaque credential (e.g. a bearer token) for downstream calls.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Identity used when no user context exists (CLI, tests).
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerIdentity")
            .field("subject", &self.subject)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A backend operation the model may invoke by name.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name the model calls this capability by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters(&self) -> &CapabilityParameters;

    /// Run the capability. The returned value is serialized to text by the
    /// dispatcher.
    async fn invoke(
        &self,
        args: &ToolArguments,
        caller: &CallerIdentity,
    ) -> Result<serde_json::Value, HandlerError>;

    /// Schema advertised to providers.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

type CapabilityHandler = dyn Fn(
        ToolArguments,
        CallerIdentity,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send>>
    + Send
    + Sync;

/// Capability backed by an async closure.
pub struct CapabilityFn {
    name: String,
    description: String,
    parameters: CapabilityParameters,
    handler: Arc<CapabilityHandler>,
}

impl CapabilityFn {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: CapabilityParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, CallerIdentity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, caller| Box::pin(handler(args, caller))),
        }
    }
}

#[async_trait]
impl Capability for CapabilityFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &CapabilityParameters {
        &self.parameters
    }

    async fn invoke(
        &self,
        args: &ToolArguments,
        caller: &CallerIdentity,
    ) -> Result<serde_json::Value, HandlerError> {
        (self.handler)(args.clone(), caller.clone()).await
    }
}

impl fmt::Debug for CapabilityFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
