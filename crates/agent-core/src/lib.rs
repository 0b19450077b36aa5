//! # agent-core
//!
//! Consultation agent engine with a provider-agnostic LLM abstraction and a
//! grouped, concurrent tool dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       ConsultationEngine                         │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────────┐   │
//! │  │  Reasoning  │──│    Tool      │──│     ToolRegistry       │   │
//! │  │    Step     │  │  Dispatcher  │  │  (grouped capabilities)│   │
//! │  └─────────────┘  └──────────────┘  └────────────────────────┘   │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────────┐   │
//! │  │  Response   │──│  JsonStream  │  │     LlmProvider        │   │
//! │  │  Generator  │  │    Filter    │  │     (Strategy)         │   │
//! │  └─────────────┘  └──────────────┘  └────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//!        │ AgentEvent stream                │ SessionSnapshot
//!        ▼                                  ▼
//!   transport (SSE)                    SessionStore
//! ```
//!
//! The engine is stateless between turns: callers hand it a
//! [`SessionState`] and receive a [`TurnOutcome`] carrying the snapshot to
//! persist for the next turn.

pub mod context;
pub mod controller;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod response;
pub mod session;
pub mod state;
pub mod stream;
pub mod tool;

pub use context::{MedicalContext, MedicalContextUpdate};
pub use controller::{ConsultationEngine, EngineBuilder, TurnInput};
pub use decision::{Action, AgentDecision, ReasoningOutcome};
pub use dispatcher::{DispatcherConfig, ToolDispatcher};
pub use error::{AgentError, Result};
pub use events::{AgentEvent, EventSink, TurnOutcome};
pub use message::{Message, PlainMessage, Role};
pub use provider::LlmProvider;
pub use reasoning::AgentConfig;
pub use session::{MemorySessionStore, SessionId, SessionStore, TurnLocks};
pub use state::{RiskLevel, SessionSnapshot, SessionState, Stage};
pub use tool::{Tool, ToolCall, ToolGroup, ToolRegistry, ToolResult};
