//! HTTP/SSE Handlers

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::UnboundedReceiverStream;

use agent_core::{
    provider::ModelInfo, AgentError, AgentEvent, EventSink, SessionId, SessionSnapshot, TurnInput,
    TurnOutcome,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ollama_connected: bool,
    pub specialty: String,
    pub capabilities: Vec<String>,
    /// Turns currently holding a session lock
    pub turns_in_flight: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultRequest {
    /// Omit to start a new consultation
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub message: String,

    /// Base64 images, optionally as data URLs
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultResponse {
    pub session_id: String,

    #[serde(flatten)]
    pub outcome: TurnOutcome,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// Whether the same request may succeed later
    pub retryable: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
            retryable: false,
        }),
    )
}

fn agent_error(e: &AgentError) -> ApiError {
    let (status, code) = match e {
        AgentError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        AgentError::ProviderUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE"),
        AgentError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        AgentError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
    };
    let (status, Json(mut body)) = api_error(status, e.user_message(), code);
    body.retryable = e.is_retryable();
    (status, Json(body))
}

// ============================================================================
// Consultation
// ============================================================================

fn validate(request: &ConsultRequest) -> Result<(), ApiError> {
    if request.message.trim().is_empty() && request.images.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "A message or an image is required",
            "EMPTY_MESSAGE",
        ));
    }
    Ok(())
}

/// Load → turn → save, holding the session's turn lock throughout
async fn run_consultation(
    state: &AppState,
    request: ConsultRequest,
    events: &EventSink,
) -> Result<(SessionId, TurnOutcome), AgentError> {
    let id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .map_or_else(SessionId::new, SessionId::from_string);

    let report = |e: &AgentError| {
        events.emit(AgentEvent::Error {
            message: e.user_message(),
        });
    };

    let _guard = state.locks.acquire(&id).await.inspect_err(report)?;
    let session = match state.sessions.load(&id).inspect_err(report)? {
        Some(snapshot) => state.engine.restore(snapshot),
        None => {
            tracing::info!(session = %id, "New consultation");
            state.engine.new_session(id.clone())
        }
    };

    let input = TurnInput {
        message: request.message,
        images: request.images,
    };
    let outcome = state.engine.run_turn(session, input, events).await?;

    // The terminal event is already out; a failed save is only logged here.
    state
        .sessions
        .save(&id, &outcome.next_state)
        .inspect_err(|e| tracing::error!(session = %id, error = %e, "Failed to persist session"))?;

    Ok((id, outcome))
}

/// One consultation turn, JSON in and out
pub async fn consult(
    State(state): State<AppState>,
    Json(request): Json<ConsultRequest>,
) -> Result<Json<ConsultResponse>, ApiError> {
    validate(&request)?;

    let (id, outcome) = run_consultation(&state, request, &EventSink::discard())
        .await
        .map_err(|e| agent_error(&e))?;

    Ok(Json(ConsultResponse {
        session_id: id.to_string(),
        outcome,
    }))
}

/// One consultation turn streamed as server-sent events
///
/// Each SSE event is named after the event type (`meta`, `chunk`,
/// `toolCall`, `toolResult`, `complete`, `error`) and carries its JSON.
pub async fn consult_stream(
    State(state): State<AppState>,
    Json(request): Json<ConsultRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate(&request)?;

    let (sink, rx) = EventSink::channel();
    tokio::spawn(async move {
        if let Err(e) = run_consultation(&state, request, &sink).await {
            tracing::warn!(error = %e, "Streamed consultation ended with error");
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let frame = Event::default().event(event.name());
        Ok(frame.json_data(&event).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode event");
            Event::default().event("error").data(r#"{"type":"error","message":"encoding failed"}"#)
        }))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============================================================================
// Sessions
// ============================================================================

/// Stored snapshot of a consultation
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let id = SessionId::from_string(id);
    match state.sessions.load(&id) {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Session not found", "NOT_FOUND")),
        Err(e) => Err(agent_error(&e)),
    }
}

/// Forget a consultation
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SessionId::from_string(id);
    let _guard = state.locks.acquire(&id).await.map_err(|e| agent_error(&e))?;
    state.sessions.delete(&id).map_err(|e| agent_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Health & Models
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ollama_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if ollama_connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        ollama_connected,
        specialty: state.specialty.to_string(),
        capabilities: state.engine.tools().names().into_iter().map(String::from).collect(),
        turns_in_flight: state.locks.active(),
    })
}

/// Models the provider can serve
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    state
        .provider
        .list_models()
        .await
        .map(Json)
        .map_err(|e| agent_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agent_core::mock::ScriptedProvider;
    use agent_core::{MemorySessionStore, TurnLocks};
    use medical_advisor::{AdvisorBuilder, Specialty};

    fn state(provider: ScriptedProvider) -> AppState {
        let provider = Arc::new(provider);
        let engine = AdvisorBuilder::new(provider.clone())
            .specialty(Specialty::General)
            .build()
            .unwrap();
        AppState {
            engine: Arc::new(engine),
            provider,
            sessions: Arc::new(MemorySessionStore::new()),
            locks: Arc::new(TurnLocks::new()),
            specialty: Specialty::General,
        }
    }

    fn request(session_id: Option<&str>, message: &str) -> ConsultRequest {
        ConsultRequest {
            session_id: session_id.map(String::from),
            message: message.into(),
            images: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_consult_persists_between_turns() {
        let state = state(
            ScriptedProvider::new()
                .reply(r#"{"action": "respond", "response": "How long?", "medicalContextUpdate": {"symptoms": ["cough"]}}"#)
                .reply(r#"{"action": "respond", "response": "Any fever?", "medicalContextUpdate": {"duration": "3 days"}}"#),
        );

        let Json(first) = consult(State(state.clone()), Json(request(None, "I have a cough")))
            .await
            .unwrap();
        let Json(second) = consult(State(state.clone()), Json(request(Some(&first.session_id), "3 days")))
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.outcome.message, "Any fever?");

        let stored = state
            .sessions
            .load(&SessionId::from_string(first.session_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.history.len(), 4);
        assert_eq!(stored.medical_context.symptoms, vec!["cough"]);
        assert_eq!(stored.medical_context.duration, "3 days");
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let state = state(ScriptedProvider::new());
        let (status, _) = consult(State(state), Json(request(None, "  "))).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_previous_snapshot() {
        let state = state(
            ScriptedProvider::new()
                .reply(r#"{"action": "respond", "response": "Hello, what brings you here?"}"#)
                .fail("connection refused"),
        );

        let Json(first) = consult(State(state.clone()), Json(request(None, "hi"))).await.unwrap();
        let (status, Json(body)) = consult(State(state.clone()), Json(request(Some(&first.session_id), "headache")))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.starts_with("Sorry"));
        assert!(!body.retryable);

        let stored = state
            .sessions
            .load(&SessionId::from_string(first.session_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[test]
    fn test_transient_errors_marked_retryable() {
        let (status, Json(body)) = agent_error(&AgentError::RateLimited("slow down".into()));
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.code, "RATE_LIMITED");
        assert!(body.retryable);

        let (status, Json(body)) = agent_error(&AgentError::ProviderUnavailable("ollama down".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.retryable);
    }

    #[tokio::test]
    async fn test_health_reports_turns_in_flight() {
        let state = state(ScriptedProvider::new());
        let id = SessionId::from_string("busy");
        let _guard = state.locks.acquire(&id).await.unwrap();

        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.turns_in_flight, 1);
    }

    #[tokio::test]
    async fn test_streamed_events_are_ordered() {
        let state = state(
            ScriptedProvider::new().reply(r#"{"action": "respond", "response": "Tell me more about the pain."}"#),
        );
        let (sink, mut rx) = EventSink::channel();

        run_consultation(&state, request(Some("s-1"), "my back hurts"), &sink)
            .await
            .unwrap();
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.first().map(AgentEvent::name), Some("meta"));
        assert_eq!(events.last().map(AgentEvent::name), Some("complete"));
        assert!(events.iter().any(|e| e.name() == "chunk"));
        assert!(state.sessions.load(&SessionId::from_string("s-1")).unwrap().is_some());
    }
}
