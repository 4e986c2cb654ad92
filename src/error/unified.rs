//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Stream,
    Storage,
    Configuration,
    Serialization,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Start a new turn; nothing is retried in place.
    RetryTurn,
    CheckCredentials,
    CheckConfiguration,
    CheckStorage,
    IncreaseTimeout,
    ContactSupport,
}

impl RecoverySuggestion {
    /// Short advice for a person reading the error.
    pub fn hint(self) -> &'static str {
        match self {
            Self::RetryTurn => "send the message again",
            Self::CheckCredentials => "check the provider API key",
            Self::CheckConfiguration => "check the configuration file and SCRIVIA_* variables",
            Self::CheckStorage => "check that the session database is readable and writable",
            Self::IncreaseTimeout => "raise stream_idle_timeout_ms",
            Self::ContactSupport => "see the log output for details",
        }
    }
}
