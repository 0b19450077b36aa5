//! Agent Decisions
//!
//! The structured output of a reasoning pass and the lenient decoder that
//! turns free provider text into one.
//!
//! Decoding order:
//! 1. ```` ```tool ```` blocks (text tool protocol)
//! 2. strict JSON parse of the whole payload
//! 3. the first fenced JSON block
//! 4. the first balanced `{...}` object in the text
//! 5. fallback: `respond` with the raw text
//!
//! A malformed structured reply never fails the turn.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::context::MedicalContextUpdate;
use crate::error::{AgentError, Result};
use crate::state::Stage;
use crate::tool::ToolCall;

/// Next action requested by the reasoning step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Respond,
    #[serde(alias = "use_tool", alias = "tool")]
    UseTool,
    Diagnose,
    End,
}

/// Structured decision; the only state-transition signal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDecision {
    pub action: Action,

    #[serde(default)]
    pub thought: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_options: Option<Vec<String>>,

    #[serde(
        default,
        alias = "medicalContext",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_context"
    )]
    pub medical_context_update: Option<MedicalContextUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_stage")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_progress")]
    pub progress: Option<i64>,

    /// Calls carried inside a `useTool` decision
    #[serde(default, alias = "tools", skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AgentDecision {
    /// Plain `respond` decision with the given text
    pub fn respond(response: impl Into<String>) -> Self {
        Self {
            action: Action::Respond,
            thought: String::new(),
            response: Some(response.into()),
            quick_options: None,
            medical_context_update: None,
            stage: None,
            progress: None,
            tool_calls: Vec::new(),
        }
    }

    /// Ready-made response text, if any
    pub fn response_text(&self) -> Option<&str> {
        self.response
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// What a reasoning pass produced
#[derive(Clone, Debug, PartialEq)]
pub enum ReasoningOutcome {
    /// Call these tools before responding
    ToolCalls(Vec<ToolCall>),
    /// Terminal or conversational decision
    Decision(AgentDecision),
}

/// Decode free provider text into a reasoning outcome
pub fn parse_reasoning(content: &str) -> ReasoningOutcome {
    let tool_calls = parse_tool_blocks(content);
    if !tool_calls.is_empty() {
        return ReasoningOutcome::ToolCalls(tool_calls);
    }

    match parse_decision(content) {
        Ok(decision) if decision.action == Action::UseTool && !decision.tool_calls.is_empty() => {
            ReasoningOutcome::ToolCalls(decision.tool_calls)
        }
        Ok(decision) => ReasoningOutcome::Decision(decision),
        Err(e) => {
            if let Some(call) = parse_inline_tool_call(content) {
                return ReasoningOutcome::ToolCalls(vec![call]);
            }
            tracing::warn!(error = %e, "Falling back to raw text response");
            ReasoningOutcome::Decision(AgentDecision::respond(content.trim()))
        }
    }
}

/// Strict-then-lenient decoding of an [`AgentDecision`]
pub fn parse_decision(content: &str) -> Result<AgentDecision> {
    let trimmed = content.trim();

    if let Ok(decision) = serde_json::from_str::<AgentDecision>(trimmed) {
        return Ok(decision);
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(decision) = serde_json::from_str::<AgentDecision>(block.trim()) {
            return Ok(decision);
        }
    }

    for candidate in json_object_candidates(trimmed) {
        if let Ok(decision) = serde_json::from_str::<AgentDecision>(candidate) {
            return Ok(decision);
        }
    }

    Err(AgentError::DecisionParse(format!(
        "no decision object in {} chars of output",
        trimmed.len()
    )))
}

/// First balanced `{...}` region in `text` that parses as a JSON object
pub fn extract_json_object(text: &str) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .map(str::trim)
        .chain(json_object_candidates(text))
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        })
}

/// All ```` ```tool ```` blocks that decode as tool calls
fn parse_tool_blocks(content: &str) -> Vec<ToolCall> {
    const MARKER: &str = "```tool";

    let mut calls = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find(MARKER) {
        let after = &rest[start + MARKER.len()..];
        let Some(end) = after.find("```") else {
            break;
        };
        let body = after[..end].trim();
        match serde_json::from_str::<ToolCall>(body) {
            Ok(call) => calls.push(call),
            Err(e) => tracing::debug!(error = %e, "Ignoring malformed tool block"),
        }
        rest = &after[end + 3..];
    }

    calls
}

/// Inline JSON object with a `tool` key and no `action`
fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }
    json_object_candidates(content).find_map(|candidate| {
        let value: Value = serde_json::from_str(candidate).ok()?;
        if value.get("action").is_some() || value.get("tool").is_none() {
            return None;
        }
        serde_json::from_value(value).ok()
    })
}

/// Bodies of fenced code blocks, language tag stripped
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let tag = after[..body_start].trim();
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        if tag.is_empty() || tag.eq_ignore_ascii_case("json") {
            blocks.push(&body[..close]);
        }
        rest = &body[close + 3..];
    }

    blocks
}

/// Every balanced `{...}` region, in order of its opening brace
fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| balanced_end(&text[start..]).map(|len| &text[start..start + len]))
}

/// Byte length of the balanced object starting at `text[0] == '{'`
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn lenient_context<'de, D>(deserializer: D) -> std::result::Result<Option<MedicalContextUpdate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_stage<'de, D>(deserializer: D) -> std::result::Result<Option<Stage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_progress<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}
