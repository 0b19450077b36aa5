use std::sync::Arc;

use agent_core::mock::ScriptedProvider;
use agent_core::tool::{ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{
    AgentError, AgentEvent, ConsultationEngine, EngineBuilder, EventSink, Result, RiskLevel,
    SessionId, SessionSnapshot, Stage, Tool, ToolCall, ToolGroup, TurnInput,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

const TOOL_REQUEST: &str = "```tool\n{\"tool\": \"symptom_lookup\", \"arguments\": {\"query\": \"cough\"}}\n```";

struct FixedTool {
    name: &'static str,
    group: ToolGroup,
    output: Value,
}

#[async_trait]
impl Tool for FixedTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.into(),
            description: "Returns a fixed payload".into(),
            parameters: vec![ParameterSchema::optional("query", "string", "Anything")],
            group: self.group,
        }
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        Ok(self.output.clone())
    }
}

/// Returns the arguments it was called with
struct EchoTool {
    name: &'static str,
    group: ToolGroup,
}

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.into(),
            description: "Echoes its arguments".into(),
            parameters: vec![ParameterSchema::optional("summary", "string", "Anything")],
            group: self.group,
        }
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        Ok(Value::Object(args.clone()))
    }
}

fn echo_engine(provider: Arc<ScriptedProvider>) -> ConsultationEngine {
    EngineBuilder::new()
        .provider(provider)
        .tool(FixedTool {
            name: "risk_scoring",
            group: ToolGroup::Risk,
            output: json!({"riskLevel": "emergency", "score": 95}),
        })
        .tool(EchoTool {
            name: "image_analysis",
            group: ToolGroup::Image,
        })
        .tool(EchoTool {
            name: "generate_dossier",
            group: ToolGroup::Dossier,
        })
        .build()
        .unwrap()
}

fn engine(provider: Arc<ScriptedProvider>, max_iterations: usize) -> ConsultationEngine {
    EngineBuilder::new()
        .provider(provider)
        .tool(FixedTool {
            name: "symptom_lookup",
            group: ToolGroup::Knowledge,
            output: json!({"found": true, "summary": "common cold"}),
        })
        .tool(FixedTool {
            name: "risk_scoring",
            group: ToolGroup::Risk,
            output: json!({"riskLevel": "emergency", "score": 95}),
        })
        .tool(FixedTool {
            name: "generate_dossier",
            group: ToolGroup::Dossier,
            output: json!({"id": "dossier-1", "text": "summary"}),
        })
        .max_iterations(max_iterations)
        .build()
        .unwrap()
}

fn drain(mut rx: UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_iteration_bound_forces_response() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .repeat(TOOL_REQUEST)
            .stream_reply("Your cough is most likely viral."),
    );
    let engine = engine(provider.clone(), 3);
    let state = engine.new_session(SessionId::new());

    let outcome = engine
        .run_turn(state, TurnInput::text("I have a cough"), &EventSink::discard())
        .await
        .unwrap();

    assert_eq!(provider.complete_calls(), 3);
    assert_eq!(provider.stream_calls(), 1);
    assert_eq!(outcome.message, "Your cough is most likely viral.");
    assert_eq!(outcome.stage, Stage::Analyzing);
}

#[tokio::test]
async fn test_event_order_and_single_terminal() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(TOOL_REQUEST)
            .reply(r#"{"action": "respond", "response": "How long has it lasted?", "quickOptions": ["1 day", "1 week"]}"#),
    );
    let engine = engine(provider, 6);
    let (sink, rx) = EventSink::channel();

    let outcome = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("I have a cough"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = drain(rx);

    assert!(matches!(events.first(), Some(AgentEvent::Meta { stage: Stage::Collecting, .. })));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(events.last(), Some(AgentEvent::Complete(_))));

    let names: Vec<_> = events.iter().map(AgentEvent::name).collect();
    let calling = names.iter().position(|n| *n == "toolCall").unwrap();
    let result = names.iter().position(|n| *n == "toolResult").unwrap();
    let first_chunk = names.iter().position(|n| *n == "chunk").unwrap();
    assert!(calling < result && result < first_chunk);

    assert_eq!(outcome.message, "How long has it lasted?");
    assert_eq!(outcome.quick_options, vec!["1 day", "1 week"]);
}

#[tokio::test]
async fn test_provider_failure_emits_error() {
    let provider = Arc::new(ScriptedProvider::new().fail("connection refused"));
    let engine = engine(provider, 6);
    let (sink, rx) = EventSink::channel();

    let result = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("hello"), &sink)
        .await;
    drop(sink);
    let events = drain(rx);

    assert!(matches!(result, Err(AgentError::Provider(_))));
    assert!(matches!(events.last(), Some(AgentEvent::Error { .. })));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_context_accumulates_across_turns() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(r#"{"action": "respond", "response": "Since when?", "medicalContextUpdate": {"symptoms": ["headache"], "severity": "moderate"}}"#)
            .reply(r#"{"action": "respond", "response": "Any nausea?", "medicalContextUpdate": {"symptoms": ["Headache", "light sensitivity"], "severity": "", "duration": "2 days"}, "progress": 40}"#),
    );
    let engine = engine(provider, 6);

    let first = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("My head hurts"), &EventSink::discard())
        .await
        .unwrap();

    let restored = engine.restore(first.next_state);
    let second = engine
        .run_turn(restored, TurnInput::text("Two days now"), &EventSink::discard())
        .await
        .unwrap();

    let context = &second.next_state.medical_context;
    assert_eq!(context.symptoms, vec!["headache", "light sensitivity"]);
    assert_eq!(context.severity, "moderate");
    assert_eq!(context.duration, "2 days");
    assert_eq!(second.progress, 40);
    assert_eq!(second.next_state.history.len(), 4);
}

#[tokio::test]
async fn test_risk_and_dossier_results_update_state() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply_tools(vec![
                ToolCall::from_json("risk_scoring", json!({})),
                ToolCall::from_json("generate_dossier", json!({})),
            ])
            .reply(r#"{"action": "end", "response": "Please call emergency services now."}"#),
    );
    let engine = engine(provider, 6);

    let outcome = engine
        .run_turn(
            engine.new_session(SessionId::new()),
            TurnInput::text("Crushing chest pain and cold sweat"),
            &EventSink::discard(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.risk_level, RiskLevel::Emergency);
    assert_eq!(outcome.stage, Stage::Completed);
    assert_eq!(outcome.progress, 100);
    assert_eq!(outcome.specialty_data["dossier"]["id"], "dossier-1");
    assert_eq!(outcome.specialty_data["riskAssessment"]["score"], 95);
}

#[tokio::test]
async fn test_snapshot_survives_json() {
    let provider = Arc::new(
        ScriptedProvider::new().reply(r#"{"action": "diagnose", "response": "Likely a tension headache."}"#),
    );
    let engine = engine(provider, 6);

    let outcome = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("headache"), &EventSink::discard())
        .await
        .unwrap();

    let json = serde_json::to_string(&outcome.next_state).unwrap();
    let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(outcome.next_state, back);

    let state = engine.restore(back);
    assert_eq!(state.stage, Stage::Diagnosing);
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.iteration_count, 0);
}

#[tokio::test]
async fn test_engine_owned_arguments_override_model_values() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply_tools(vec![
                ToolCall::from_json("image_analysis", json!({"image": "uploaded photo", "context": "rash"})),
                ToolCall::from_json(
                    "generate_dossier",
                    json!({"context": "patient with cough for 3 days", "riskLevel": "low", "summary": "cough"}),
                ),
            ])
            .reply(r#"{"action": "respond", "response": "Thanks, noted."}"#),
    );
    let engine = echo_engine(provider);
    let mut state = engine.new_session(SessionId::new());
    state.medical_context.symptoms.push("cough".into());
    state.risk_level = RiskLevel::Medium;

    let outcome = engine
        .run_turn(state, TurnInput::text("Here is a photo").with_image("aGVsbG8gd29ybGQgaW1hZ2U="), &EventSink::discard())
        .await
        .unwrap();

    let image_args = &outcome.specialty_data["imageAnalysis"];
    assert_eq!(image_args["image"], "aGVsbG8gd29ybGQgaW1hZ2U=");
    assert_eq!(image_args["context"], "rash");

    let dossier_args = &outcome.specialty_data["dossier"];
    assert_eq!(dossier_args["context"]["symptoms"], json!(["cough"]));
    assert_eq!(dossier_args["riskLevel"], "medium");
    assert_eq!(dossier_args["summary"], "cough");
}

#[tokio::test]
async fn test_model_image_dropped_without_upload() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply_tools(vec![ToolCall::from_json("image_analysis", json!({"image": "photo.png"}))])
            .reply(r#"{"action": "respond", "response": "I did not receive a photo."}"#),
    );
    let engine = echo_engine(provider);

    let outcome = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("look at this"), &EventSink::discard())
        .await
        .unwrap();

    assert!(outcome.specialty_data["imageAnalysis"].get("image").is_none());
}

#[tokio::test]
async fn test_dossier_sees_risk_from_same_batch() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply_tools(vec![
                ToolCall::from_json("generate_dossier", json!({})),
                ToolCall::from_json("risk_scoring", json!({})),
            ])
            .reply(r#"{"action": "end", "response": "Please call emergency services now."}"#),
    );
    let engine = echo_engine(provider);

    let outcome = engine
        .run_turn(
            engine.new_session(SessionId::new()),
            TurnInput::text("Crushing chest pain"),
            &EventSink::discard(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.risk_level, RiskLevel::Emergency);
    assert_eq!(outcome.specialty_data["dossier"]["riskLevel"], "emergency");
}

#[tokio::test]
async fn test_use_tool_without_calls_forces_synthesis() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(r#"{"action": "useTool", "thought": "I should check something"}"#)
            .stream_reply("Could you tell me more about the pain?"),
    );
    let engine = engine(provider.clone(), 6);

    let outcome = engine
        .run_turn(engine.new_session(SessionId::new()), TurnInput::text("It hurts"), &EventSink::discard())
        .await
        .unwrap();

    assert_eq!(provider.complete_calls(), 1);
    assert_eq!(provider.stream_calls(), 1);
    assert_eq!(outcome.message, "Could you tell me more about the pain?");
    assert_eq!(outcome.stage, Stage::Collecting);
}
