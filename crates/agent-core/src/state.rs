//! Session State
//!
//! The record threaded through every step of a turn. The controller owns it
//! while a turn runs; between turns it lives in the caller's store as a
//! [`SessionSnapshot`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::MedicalContext;
use crate::message::{Conversation, PlainMessage};
use crate::session::SessionId;
use crate::tool::{ToolCall, ToolResult};

/// Consultation stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Greeting,
    Collecting,
    Analyzing,
    Diagnosing,
    Completed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Greeting => "greeting",
            Stage::Collecting => "collecting",
            Stage::Analyzing => "analyzing",
            Stage::Diagnosing => "diagnosing",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Assessed risk level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Emergency,
}

impl RiskLevel {
    /// Parse a lowercase level name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" | "moderate" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "emergency" | "critical" => Some(RiskLevel::Emergency),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full in-memory state of one conversation
#[derive(Clone, Debug)]
pub struct SessionState {
    pub session_id: SessionId,

    /// Ordered, append-only history
    pub history: Conversation,

    pub medical_context: MedicalContext,

    /// Calls requested by the last reasoning pass
    pub pending_tool_calls: Vec<ToolCall>,

    /// Results accumulated during the current turn
    pub tool_results: Vec<ToolResult>,

    pub stage: Stage,

    /// 0-100
    pub progress: u8,

    pub risk_level: RiskLevel,

    /// Payload written from capability results
    pub specialty_data: Map<String, Value>,

    pub iteration_count: usize,
    pub max_iterations: usize,

    pub current_response: String,
    pub quick_options: Vec<String>,

    /// Unrecoverable condition that forces the response path
    pub error: Option<String>,
}

impl SessionState {
    /// Fresh state for a new conversation
    pub fn new(session_id: SessionId, max_iterations: usize) -> Self {
        Self {
            session_id,
            history: Conversation::new(),
            medical_context: MedicalContext::default(),
            pending_tool_calls: Vec::new(),
            tool_results: Vec::new(),
            stage: Stage::Greeting,
            progress: 0,
            risk_level: RiskLevel::Low,
            specialty_data: Map::new(),
            iteration_count: 0,
            max_iterations,
            current_response: String::new(),
            quick_options: Vec::new(),
            error: None,
        }
    }

    /// Reset the per-turn fields before a new turn starts
    pub fn begin_turn(&mut self) {
        self.pending_tool_calls.clear();
        self.tool_results.clear();
        self.iteration_count = 0;
        self.current_response.clear();
        self.quick_options.clear();
        self.error = None;
    }

    /// Whether the reasoning loop must stop
    pub fn iteration_limit_reached(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Set progress, clamped to 0-100
    pub fn set_progress(&mut self, progress: i64) {
        self.progress = u8::try_from(progress.clamp(0, 100)).unwrap_or(100);
    }

    /// Reduce to the storage-neutral snapshot
    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            history: self.history.to_plain(),
            medical_context: self.medical_context.clone(),
            stage: self.stage,
            progress: self.progress,
            risk_level: self.risk_level,
            specialty_data: self.specialty_data.clone(),
        }
    }

    /// Rebuild from a snapshot
    pub fn from_snapshot(snapshot: SessionSnapshot, max_iterations: usize) -> Self {
        Self {
            history: Conversation::from_plain(snapshot.history),
            medical_context: snapshot.medical_context,
            stage: snapshot.stage,
            progress: snapshot.progress.min(100),
            risk_level: snapshot.risk_level,
            specialty_data: snapshot.specialty_data,
            ..Self::new(snapshot.session_id, max_iterations)
        }
    }
}

/// Plain, serializable form of [`SessionState`] persisted between turns
///
/// Transient per-turn fields (pending calls, tool results, counters, turn
/// output) are not carried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,

    #[serde(default)]
    pub history: Vec<PlainMessage>,

    #[serde(default)]
    pub medical_context: MedicalContext,

    #[serde(default)]
    pub stage: Stage,

    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub risk_level: RiskLevel,

    #[serde(default)]
    pub specialty_data: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MedicalContextUpdate;
    use crate::message::Message;
    use serde_json::json;

    #[test]
    fn test_new_state_starts_in_greeting() {
        let state = SessionState::new(SessionId::new(), 5);
        assert_eq!(state.stage, Stage::Greeting);
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_snapshot_round_trip_through_json() {
        let mut state = SessionState::new(SessionId::from_string("s-1"), 5);
        state.history.push(Message::user("I have a rash").with_image("aW1n"));
        state.history.push(Message::assistant("Where is it?"));
        state.medical_context.merge(
            &serde_json::from_value::<MedicalContextUpdate>(json!({"symptoms": ["rash"]})).unwrap(),
        );
        state.stage = Stage::Collecting;
        state.progress = 40;
        state.risk_level = RiskLevel::Medium;
        state.specialty_data.insert("riskAssessment".into(), json!({"score": 30}));
        state.iteration_count = 3;
        state.current_response = "transient".into();

        let encoded = serde_json::to_string(&state.to_snapshot()).unwrap();
        let decoded: SessionSnapshot = serde_json::from_str(&encoded).unwrap();
        let restored = SessionState::from_snapshot(decoded, 5);

        assert_eq!(restored.history.to_plain(), state.history.to_plain());
        assert_eq!(restored.medical_context, state.medical_context);
        assert_eq!(restored.stage, Stage::Collecting);
        assert_eq!(restored.progress, 40);
        assert_eq!(restored.risk_level, RiskLevel::Medium);
        assert_eq!(restored.specialty_data, state.specialty_data);
        assert_eq!(restored.iteration_count, 0);
        assert!(restored.current_response.is_empty());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut state = SessionState::new(SessionId::new(), 5);
        state.set_progress(250);
        assert_eq!(state.progress, 100);
        state.set_progress(-4);
        assert_eq!(state.progress, 0);
    }

    #[test]
    fn test_risk_level_parse() {
        assert_eq!(RiskLevel::parse("Emergency"), Some(RiskLevel::Emergency));
        assert_eq!(RiskLevel::parse("moderate"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("unknown"), None);
    }
}
