//! # agent-runtime
//!
//! LLM providers for the consultation engine.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama, including vision
//!   models for image analysis
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::OllamaProvider;
//!
//! let provider = Arc::new(OllamaProvider::from_env());
//! let engine = EngineBuilder::new()
//!     .provider(provider)
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, ConsultationEngine, EngineBuilder, LlmProvider, Message, Result, Role, Tool,
    ToolRegistry,
};
