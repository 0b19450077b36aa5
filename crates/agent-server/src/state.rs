//! Application State

use std::sync::Arc;

use agent_core::{ConsultationEngine, LlmProvider, SessionStore, TurnLocks};
use medical_advisor::Specialty;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Engine built once at startup
    pub engine: Arc<ConsultationEngine>,

    /// LLM provider (Ollama, etc.), for health and model listing
    pub provider: Arc<dyn LlmProvider>,

    /// Session snapshots between turns
    pub sessions: Arc<dyn SessionStore>,

    /// Serializes turns of the same session
    pub locks: Arc<TurnLocks>,

    pub specialty: Specialty,
}
