//! medical-consult HTTP Server
//!
//! Axum-based server exposing consultation turns as JSON and as
//! server-sent event streams, backed by a local Ollama model.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{LlmProvider, MemorySessionStore, TurnLocks};
use agent_runtime::OllamaProvider;
use medical_advisor::AdvisorBuilder;

use crate::config::ServerConfig;
use crate::handlers::{
    consult, consult_stream, delete_session, get_session, health_check, list_models,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    // Initialize LLM provider
    let provider: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::from_env());

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to Ollama");
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::info!(vision = model.supports_vision, "  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Ollama not available - consultations will fail");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    // Build the consultation engine
    let engine = AdvisorBuilder::new(provider.clone())
        .specialty(config.specialty)
        .capabilities(config.capabilities.clone())
        .model(config.model.clone())
        .llm_rewriter(config.llm_rewriter)
        .max_iterations(config.max_iterations)
        .max_concurrency(config.max_concurrency)
        .tool_timeout(config.tool_timeout)
        .build()?;

    tracing::info!(
        specialty = %config.specialty,
        model = %config.model,
        max_iterations = config.max_iterations,
        "Registered {} capabilities:",
        engine.tools().len()
    );
    for name in engine.tools().names() {
        tracing::info!("  • {}", name);
    }

    let state = AppState {
        engine: Arc::new(engine),
        provider,
        sessions: Arc::new(MemorySessionStore::new()),
        locks: Arc::new(TurnLocks::new()),
        specialty: config.specialty,
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🩺 medical-consult server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health              - Health check");
    tracing::info!("  GET    /api/models          - List available models");
    tracing::info!("  POST   /api/consult         - Consultation turn (JSON)");
    tracing::info!("  POST   /api/consult/stream  - Consultation turn (SSE)");
    tracing::info!("  GET    /api/sessions/{{id}}   - Session snapshot");
    tracing::info!("  DELETE /api/sessions/{{id}}   - Forget session");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes with CORS and request tracing
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))

        // Consultation API
        .route("/api/consult", post(consult))
        .route("/api/consult/stream", post(consult_stream))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use agent_core::mock::ScriptedProvider;

    fn app(provider: ScriptedProvider) -> Router {
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        let engine = AdvisorBuilder::new(provider.clone()).build().unwrap();
        router(AppState {
            engine: Arc::new(engine),
            provider,
            sessions: Arc::new(MemorySessionStore::new()),
            locks: Arc::new(TurnLocks::new()),
            specialty: medical_advisor::Specialty::General,
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_lists_capabilities() {
        let response = app(ScriptedProvider::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["specialty"], "general");
        assert_eq!(body["capabilities"].as_array().map(Vec::len), Some(6));
        assert_eq!(body["turns_in_flight"], 0);
    }

    #[tokio::test]
    async fn test_consult_round_trip() {
        let app = app(
            ScriptedProvider::new()
                .reply(r#"{"action": "respond", "response": "Where does it hurt?", "quickOptions": ["Head", "Chest"]}"#),
        );

        let response = app
            .clone()
            .oneshot(post_json("/api/consult", &json!({"message": "I feel unwell"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Where does it hurt?");
        assert_eq!(body["quickOptions"], json!(["Head", "Chest"]));
        assert_eq!(body["stage"], "collecting");

        let session_id = body["sessionId"].as_str().unwrap().to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["history"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let response = app(ScriptedProvider::new())
            .oneshot(Request::builder().uri("/api/sessions/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream_is_event_stream() {
        let response = app(
            ScriptedProvider::new().reply(r#"{"action": "respond", "response": "Noted."}"#),
        )
        .oneshot(post_json("/api/consult/stream", &json!({"message": "hello"})))
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: meta"));
        assert!(text.trim_end().contains("event: complete"));
    }
}
