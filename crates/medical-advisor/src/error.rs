//! Error Types for Medical Advisor

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Query rewrite failed: {0}")]
    Rewrite(String),

    #[error("Image analysis failed: {0}")]
    ImageAnalysis(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AdvisorError> for AgentError {
    fn from(err: AdvisorError) -> Self {
        match err {
            AdvisorError::InvalidArgument(msg) => AgentError::ToolValidation(msg),
            AdvisorError::UnknownCapability(name) => AgentError::ToolNotFound(name),
            other => AgentError::ToolExecution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_agent_error() {
        let err: AgentError = AdvisorError::InvalidArgument("symptoms is empty".into()).into();
        assert!(matches!(err, AgentError::ToolValidation(_)));

        let err: AgentError = AdvisorError::ImageAnalysis("no vision".into()).into();
        assert!(matches!(err, AgentError::ToolExecution(msg) if msg.contains("no vision")));
    }
}
