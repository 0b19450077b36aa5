//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Only provider-level failures abort a turn. Tool failures are folded into
/// `ToolResult` entries by the dispatcher and never surface through here.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Structured decision could not be decoded
    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    /// Session error (persistence, locking)
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_) | AgentError::RateLimited(_)
        )
    }

    /// Whether this error aborts the current turn
    pub fn aborts_turn(&self) -> bool {
        matches!(
            self,
            AgentError::Provider(_)
                | AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Auth(_)
                | AgentError::Session(_)
                | AgentError::Config(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(_) | AgentError::ProviderUnavailable(_) => {
                "Sorry, the consultation service is temporarily unavailable. Please try again in a moment.".into()
            }
            AgentError::ToolNotFound(name) => format!("The capability '{}' is not available.", name),
            AgentError::ToolValidation(msg) => format!("Invalid capability input: {}", msg),
            AgentError::RateLimited(_) => "Too many requests right now. Please wait a moment and try again.".into(),
            AgentError::Auth(_) => "The consultation service is misconfigured. Please contact support.".into(),
            _ => "Sorry, something went wrong while processing your message. Please try again.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
