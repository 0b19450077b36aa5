//! Consultation Controller
//!
//! The per-turn state machine:
//!
//! ```text
//!            ┌──────────────── useTool ───────────────┐
//!            ▼                                        │
//!   ──► Reasoning ──► respond/diagnose/end ──► ResponseGeneration ──► End
//!            │                                        ▲
//!            └─► ToolExecution ──► Reasoning          │
//!            └── iteration limit / error ─────────────┘
//! ```
//!
//! Every pass through `Reasoning` increments `iteration_count`; once it
//! reaches `max_iterations` the turn is forced into response generation, so a
//! provider that keeps requesting tools still terminates.
//!
//! The engine is immutable once built. Build it at startup and share it
//! behind an `Arc`; every turn gets its own `SessionState`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::decision::{Action, AgentDecision, ReasoningOutcome};
use crate::dispatcher::{DispatcherConfig, ToolDispatcher};
use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, EventSink, ToolCallStatus, TurnOutcome};
use crate::message::Message;
use crate::provider::LlmProvider;
use crate::reasoning::{AgentConfig, ReasoningStep};
use crate::response::ResponseGenerator;
use crate::session::SessionId;
use crate::state::{RiskLevel, SessionSnapshot, SessionState, Stage};
use crate::tool::{Tool, ToolCall, ToolGroup, ToolRegistry, ToolResult};

/// One user message and its attachments
#[derive(Clone, Debug, Default)]
pub struct TurnInput {
    pub message: String,

    /// Base64 images uploaded with this message
    pub images: Vec<String>,
}

impl TurnInput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Node {
    Reasoning,
    ToolExecution,
    ResponseGeneration,
    End,
}

/// The reasoning-and-tool-execution engine
pub struct ConsultationEngine {
    provider: Arc<dyn LlmProvider>,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
}

impl ConsultationEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
        dispatcher_config: DispatcherConfig,
    ) -> Self {
        Self {
            provider,
            dispatcher: ToolDispatcher::new(tools, dispatcher_config),
            config,
        }
    }

    /// Fresh state for a new conversation
    pub fn new_session(&self, id: SessionId) -> SessionState {
        SessionState::new(id, self.config.max_iterations)
    }

    /// Re-hydrate state persisted after an earlier turn
    pub fn restore(&self, snapshot: SessionSnapshot) -> SessionState {
        SessionState::from_snapshot(snapshot, self.config.max_iterations)
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn
    ///
    /// Emits `meta`, any chunk and tool-status events, then exactly one
    /// terminal event. On error nothing from this turn should be persisted;
    /// the caller keeps its previous snapshot.
    pub async fn run_turn(
        &self,
        state: SessionState,
        input: TurnInput,
        events: &EventSink,
    ) -> Result<TurnOutcome> {
        let session_id = state.session_id.clone();

        match self.drive(state, input, events).await {
            Ok(outcome) => {
                events.emit(AgentEvent::Complete(outcome.clone()));
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "Turn failed");
                events.emit(AgentEvent::Error {
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        mut state: SessionState,
        input: TurnInput,
        events: &EventSink,
    ) -> Result<TurnOutcome> {
        state.begin_turn();

        let mut user_message = Message::user(input.message.trim());
        user_message.images.clone_from(&input.images);
        let has_input = !user_message.content.is_empty() || !user_message.images.is_empty();
        state.history.push(user_message);
        if has_input && state.stage == Stage::Greeting {
            state.stage = Stage::Collecting;
        }

        events.emit(AgentEvent::Meta {
            session_id: state.session_id.clone(),
            stage: state.stage,
            progress: state.progress,
        });

        let mut decision: Option<AgentDecision> = None;
        let mut node = Node::Reasoning;

        while node != Node::End {
            node = match node {
                Node::Reasoning => self.reason(&mut state, &mut decision).await?,
                Node::ToolExecution => self.execute_tools(&mut state, &input, events).await,
                Node::ResponseGeneration => {
                    let generator = ResponseGenerator::new(self.provider.as_ref(), &self.config);
                    state.current_response = generator.generate(&state, decision.as_ref(), events).await?;
                    Node::End
                }
                Node::End => Node::End,
            };
        }

        state.quick_options = decision
            .as_ref()
            .and_then(|d| d.quick_options.clone())
            .unwrap_or_default();
        state.history.push(Message::assistant(&state.current_response));

        tracing::info!(
            session = %state.session_id,
            iterations = state.iteration_count,
            tools = state.tool_results.len(),
            stage = %state.stage,
            risk = %state.risk_level,
            "Turn completed"
        );

        Ok(TurnOutcome {
            message: state.current_response.clone(),
            specialty_data: state.specialty_data.clone(),
            quick_options: state.quick_options.clone(),
            risk_level: state.risk_level,
            stage: state.stage,
            progress: state.progress,
            next_state: state.to_snapshot(),
        })
    }

    async fn reason(&self, state: &mut SessionState, decision: &mut Option<AgentDecision>) -> Result<Node> {
        if state.iteration_limit_reached() {
            tracing::warn!(
                session = %state.session_id,
                max = state.max_iterations,
                "Iteration limit reached, forcing response"
            );
            return Ok(Node::ResponseGeneration);
        }
        if let Some(error) = &state.error {
            tracing::warn!(session = %state.session_id, %error, "Forcing response after error");
            return Ok(Node::ResponseGeneration);
        }

        state.iteration_count += 1;
        let step = ReasoningStep::new(self.provider.as_ref(), self.dispatcher.registry(), &self.config);

        match step.run(state).await? {
            ReasoningOutcome::ToolCalls(calls) => {
                tracing::debug!(iteration = state.iteration_count, calls = calls.len(), "Reasoning requested tools");
                state.pending_tool_calls = calls;
                Ok(Node::ToolExecution)
            }
            ReasoningOutcome::Decision(d) => {
                tracing::debug!(iteration = state.iteration_count, action = ?d.action, "Reasoning decided");
                apply_decision(state, &d);
                let next = if d.action == Action::UseTool {
                    state.error = Some("tool use requested without any tool calls".into());
                    Node::Reasoning
                } else {
                    Node::ResponseGeneration
                };
                *decision = Some(d);
                Ok(next)
            }
        }
    }

    /// Run the pending batch
    ///
    /// Dossier calls run after the rest of the batch has been applied, so
    /// they see the risk level and facts produced alongside them. Results
    /// are recorded in request order.
    async fn execute_tools(&self, state: &mut SessionState, input: &TurnInput, events: &EventSink) -> Node {
        let calls = std::mem::take(&mut state.pending_tool_calls);
        let registry = self.dispatcher.registry();

        for call in &calls {
            events.tool_call(&call.name, ToolCallStatus::Calling);
        }
        if state.stage < Stage::Analyzing {
            state.stage = Stage::Analyzing;
        }

        let (late, early): (Vec<_>, Vec<_>) = calls
            .into_iter()
            .enumerate()
            .partition(|(_, call)| registry.group_of(&call.name) == ToolGroup::Dossier);

        let mut recorded = Vec::new();
        for phase in [early, late] {
            if phase.is_empty() {
                continue;
            }
            let (indices, batch): (Vec<usize>, Vec<_>) = phase
                .into_iter()
                .map(|(index, mut call)| {
                    let group = registry.group_of(&call.name);
                    inject_engine_args(&mut call, group, &*state, input);
                    (index, call)
                })
                .unzip();

            let results = self.dispatcher.dispatch(&batch, events).await;
            for result in &results {
                apply_tool_result(state, result);
            }
            recorded.extend(indices.into_iter().zip(results));
        }

        recorded.sort_by_key(|(index, _)| *index);
        state.tool_results.extend(recorded.into_iter().map(|(_, result)| result));

        Node::Reasoning
    }
}

/// Overwrite the arguments the engine owns
///
/// The uploaded image and the accumulated facts never come from the model;
/// anything it put under these keys is replaced or removed.
fn inject_engine_args(call: &mut ToolCall, group: ToolGroup, state: &SessionState, input: &TurnInput) {
    match group {
        ToolGroup::Image => match input.images.first() {
            Some(image) => {
                call.args.insert("image".into(), Value::String(image.clone()));
            }
            None => {
                call.args.remove("image");
            }
        },
        ToolGroup::Dossier => {
            match serde_json::to_value(&state.medical_context) {
                Ok(context) => {
                    call.args.insert("context".into(), context);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not attach medical context");
                    call.args.remove("context");
                }
            }
            call.args
                .insert("riskLevel".into(), Value::String(state.risk_level.as_str().into()));
        }
        _ => {}
    }
}

/// Fold a decision's side effects into the state
fn apply_decision(state: &mut SessionState, decision: &AgentDecision) {
    if let Some(update) = &decision.medical_context_update {
        state.medical_context.merge(update);
    }

    match (decision.stage, decision.action) {
        (Some(stage), _) => state.stage = stage,
        (None, Action::Diagnose) => state.stage = Stage::Diagnosing,
        (None, Action::End) => state.stage = Stage::Completed,
        (None, Action::Respond | Action::UseTool) => {}
    }

    if let Some(progress) = decision.progress {
        state.set_progress(progress);
    }
}

/// Write a capability result into the state according to its group
fn apply_tool_result(state: &mut SessionState, result: &ToolResult) {
    if !result.success {
        return;
    }

    match result.group {
        ToolGroup::Risk => {
            if let Some(level) = result
                .result
                .get("riskLevel")
                .and_then(Value::as_str)
                .and_then(RiskLevel::parse)
            {
                state.risk_level = level;
            }
            state
                .specialty_data
                .insert("riskAssessment".into(), result.result.clone());
        }
        ToolGroup::Dossier => {
            state.specialty_data.insert("dossier".into(), result.result.clone());
            state.stage = Stage::Completed;
            state.progress = 100;
        }
        ToolGroup::Image => {
            state
                .specialty_data
                .insert("imageAnalysis".into(), result.result.clone());
        }
        ToolGroup::Medication => {
            state
                .specialty_data
                .insert("medication".into(), result.result.clone());
        }
        ToolGroup::Knowledge | ToolGroup::Other => {}
    }
}

/// Builder for the engine, mirroring the usual agent setup
pub struct EngineBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
    dispatcher: DispatcherConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn diagnosis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.diagnosis_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn history_window(mut self, n: usize) -> Self {
        self.config.history_window = n;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.dispatcher.max_concurrency = n;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.call_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ConsultationEngine> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }
        if self.dispatcher.max_concurrency == 0 {
            return Err(AgentError::Config("max_concurrency must be at least 1".into()));
        }

        Ok(ConsultationEngine::new(
            provider,
            Arc::new(self.tools),
            self.config,
            self.dispatcher,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;
    use serde_json::json;

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(EngineBuilder::new().build(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_zero_iterations() {
        let result = EngineBuilder::new()
            .provider(Arc::new(ScriptedProvider::new()))
            .max_iterations(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_decision_stage_defaults() {
        let mut state = SessionState::new(SessionId::new(), 3);
        let mut d = AgentDecision::respond("x");
        d.action = Action::Diagnose;
        d.progress = Some(140);
        apply_decision(&mut state, &d);
        assert_eq!(state.stage, Stage::Diagnosing);
        assert_eq!(state.progress, 100);

        d.stage = Some(Stage::Collecting);
        apply_decision(&mut state, &d);
        assert_eq!(state.stage, Stage::Collecting);
    }

    #[test]
    fn test_apply_tool_result_by_group() {
        let mut state = SessionState::new(SessionId::new(), 3);
        let call = ToolCall::from_json("risk_scoring", json!({}));

        apply_tool_result(
            &mut state,
            &ToolResult::success(&call, ToolGroup::Risk, json!({"riskLevel": "high", "score": 60}), 1),
        );
        assert_eq!(state.risk_level, RiskLevel::High);
        assert_eq!(state.specialty_data["riskAssessment"]["score"], 60);

        apply_tool_result(
            &mut state,
            &ToolResult::failure(&call, ToolGroup::Risk, "timeout", 1),
        );
        assert_eq!(state.risk_level, RiskLevel::High);

        apply_tool_result(
            &mut state,
            &ToolResult::success(&call, ToolGroup::Dossier, json!({"id": "d1"}), 1),
        );
        assert_eq!(state.stage, Stage::Completed);
        assert_eq!(state.progress, 100);
        assert!(state.specialty_data.contains_key("dossier"));
    }
}
