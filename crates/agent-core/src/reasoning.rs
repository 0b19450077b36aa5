//! Reasoning Step
//!
//! One Think pass of the Observe→Think→Act loop: build the prompt from the
//! session state, ask the provider, and decode the answer into either tool
//! calls or a decision.

use serde_json::Value;

use crate::decision::{parse_reasoning, ReasoningOutcome};
use crate::error::Result;
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider, ToolChoice};
use crate::state::SessionState;
use crate::tool::{ToolRegistry, ToolResult};

/// Engine configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt (specialty instructions)
    pub system_prompt: String,

    /// Instructions used when a response must be synthesized
    pub diagnosis_prompt: String,

    /// Maximum reasoning passes per turn
    pub max_iterations: usize,

    /// Number of recent user/assistant messages sent to the provider
    pub history_window: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Words per chunk when streaming a ready-made response
    pub chunk_words: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            diagnosis_prompt: DEFAULT_DIAGNOSIS_PROMPT.into(),
            max_iterations: 6,
            history_window: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            chunk_words: 4,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful medical consultation assistant. \
Collect symptoms step by step, ask one question at a time, and use tools when they help.";

const DEFAULT_DIAGNOSIS_PROMPT: &str = "Summarize the consultation for the patient in plain language. \
Use the collected facts and tool results below. State the likely explanations, the assessed risk level, \
and concrete next steps. Do not output JSON.";

/// Output contract appended to every reasoning prompt
const DECISION_FORMAT: &str = r#"## Output Format

Either call tools (see Available Tools), or answer with exactly one JSON object:
{"action": "respond" | "diagnose" | "end",
 "thought": "short private reasoning",
 "response": "message shown to the patient",
 "quickOptions": ["short reply option", "..."],
 "medicalContextUpdate": {"symptoms": [], "severity": "", "duration": "", "triggers": [], "history": [], "attributes": {}},
 "stage": "greeting" | "collecting" | "analyzing" | "diagnosing" | "completed",
 "progress": 0-100}
Use "diagnose" once enough facts are collected; omit "response" to have a summary written for you."#;

/// Longest serialized tool result included in the prompt
const MAX_RESULT_CHARS: usize = 1_500;

/// A single reasoning pass
pub struct ReasoningStep<'a> {
    provider: &'a dyn LlmProvider,
    registry: &'a ToolRegistry,
    config: &'a AgentConfig,
}

impl<'a> ReasoningStep<'a> {
    pub fn new(provider: &'a dyn LlmProvider, registry: &'a ToolRegistry, config: &'a AgentConfig) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Ask the provider what to do next
    pub async fn run(&self, state: &SessionState) -> Result<ReasoningOutcome> {
        let messages = self.build_messages(state);
        let schemas = self.registry.schemas();
        let options = self.config.generation.with_tool_choice(ToolChoice::Auto);

        let completion = self.provider.complete(&messages, &schemas, &options).await?;

        if !completion.tool_calls.is_empty() {
            tracing::debug!(calls = completion.tool_calls.len(), "Provider requested tools natively");
            return Ok(ReasoningOutcome::ToolCalls(completion.tool_calls));
        }

        Ok(parse_reasoning(&completion.content))
    }

    /// System prompt followed by the recent dialogue
    pub fn build_messages(&self, state: &SessionState) -> Vec<Message> {
        let mut messages = vec![Message::system(self.build_system_prompt(state))];
        messages.extend(state.history.recent(self.config.history_window));
        messages
    }

    fn build_system_prompt(&self, state: &SessionState) -> String {
        let mut prompt = self.config.system_prompt.clone();

        prompt.push_str("\n\n");
        prompt.push_str(DECISION_FORMAT);

        if self.config.inject_tool_descriptions && !self.registry.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.registry.generate_prompt_section());
        }

        prompt.push_str(&format!(
            "\n## Consultation State\nstage: {}\nprogress: {}\nrisk level: {}\n",
            state.stage, state.progress, state.risk_level
        ));

        prompt.push_str("\n## Collected Facts\n");
        prompt.push_str(&serde_json::to_string(&state.medical_context).unwrap_or_default());
        prompt.push('\n');

        if !state.tool_results.is_empty() {
            prompt.push_str("\n## Tool Results This Turn\n");
            prompt.push_str(&format_tool_results(&state.tool_results));
        }

        prompt
    }
}

/// One line per result, long payloads truncated
pub fn format_tool_results(results: &[ToolResult]) -> String {
    let mut out = String::new();
    for result in results {
        if result.success {
            let payload = truncate(&compact(&result.result), MAX_RESULT_CHARS);
            out.push_str(&format!("- {} succeeded: {}\n", result.tool, payload));
        } else {
            out.push_str(&format!(
                "- {} failed: {}\n",
                result.tool,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    out
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
