//! Turn Events
//!
//! The ordered event stream a caller receives while a turn runs:
//! one `meta`, then `chunk` / `toolCall` / `toolResult` events, then exactly
//! one terminal `complete` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::session::SessionId;
use crate::state::{RiskLevel, SessionSnapshot, Stage};

/// Progress of a single tool call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Calling,
    Executing,
}

/// Outcome of a single tool call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Failure,
}

/// Final payload of a successful turn
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub message: String,
    pub specialty_data: Map<String, Value>,
    pub quick_options: Vec<String>,
    pub risk_level: RiskLevel,
    pub stage: Stage,
    pub progress: u8,
    /// Snapshot to persist before the next turn
    pub next_state: SessionSnapshot,
}

/// Streaming event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentEvent {
    #[serde(rename_all = "camelCase")]
    Meta {
        session_id: SessionId,
        stage: Stage,
        progress: u8,
    },
    Chunk {
        text: String,
    },
    ToolCall {
        tool: String,
        status: ToolCallStatus,
    },
    ToolResult {
        tool: String,
        status: ToolResultStatus,
    },
    Complete(TurnOutcome),
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Complete(_) | AgentEvent::Error { .. })
    }

    /// Event name used for transport framing
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Meta { .. } => "meta",
            AgentEvent::Chunk { .. } => "chunk",
            AgentEvent::ToolCall { .. } => "toolCall",
            AgentEvent::ToolResult { .. } => "toolResult",
            AgentEvent::Complete(_) => "complete",
            AgentEvent::Error { .. } => "error",
        }
    }
}

/// Sending half of a turn's event stream
///
/// A sink without a receiver is valid; events are then discarded.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    /// New sink and the receiver that observes it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that drops every event
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
    }

    pub fn chunk(&self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.emit(AgentEvent::Chunk { text });
        }
    }

    pub fn tool_call(&self, tool: &str, status: ToolCallStatus) {
        self.emit(AgentEvent::ToolCall {
            tool: tool.to_string(),
            status,
        });
    }

    pub fn tool_result(&self, tool: &str, success: bool) {
        let status = if success {
            ToolResultStatus::Success
        } else {
            ToolResultStatus::Failure
        };
        self.emit(AgentEvent::ToolResult {
            tool: tool.to_string(),
            status,
        });
    }
}
