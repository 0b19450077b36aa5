//! Server Configuration
//!
//! Read from the environment (after `.env` is loaded).

use std::time::Duration;

use anyhow::{Context, Result};

use medical_advisor::{Capability, Specialty};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Consultation domain
    pub specialty: Specialty,

    /// Ollama model for reasoning, synthesis and image analysis
    pub model: String,

    /// Reasoning passes per turn
    pub max_iterations: usize,

    /// Per-capability timeout
    pub tool_timeout: Duration,

    /// Concurrent capability calls per batch
    pub max_concurrency: usize,

    /// Enabled capabilities
    pub capabilities: Vec<Capability>,

    /// Rewrite weak knowledge queries with the model
    pub llm_rewriter: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            specialty: Specialty::General,
            model: "llama3.2".into(),
            max_iterations: 6,
            tool_timeout: Duration::from_secs(30),
            max_concurrency: 5,
            capabilities: Capability::ALL.to_vec(),
            llm_rewriter: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_iterations = match get("MAX_ITERATIONS") {
            Some(v) => v.parse().with_context(|| format!("MAX_ITERATIONS must be a number, got {v:?}"))?,
            None => defaults.max_iterations,
        };
        let tool_timeout = match get("TOOL_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .with_context(|| format!("TOOL_TIMEOUT_SECS must be a number, got {v:?}"))?,
            ),
            None => defaults.tool_timeout,
        };
        let max_concurrency = match get("MAX_TOOL_CONCURRENCY") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MAX_TOOL_CONCURRENCY must be a number, got {v:?}"))?,
            None => defaults.max_concurrency,
        };
        let capabilities = match get("CONSULT_CAPABILITIES") {
            Some(v) => Capability::parse_list(&v).context("Invalid CONSULT_CAPABILITIES")?,
            None => defaults.capabilities,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            specialty: get("CONSULT_SPECIALTY").map_or(defaults.specialty, |s| Specialty::from_tag(&s)),
            model: get("CONSULT_MODEL").unwrap_or(defaults.model),
            max_iterations,
            tool_timeout,
            max_concurrency,
            capabilities,
            llm_rewriter: get("LLM_QUERY_REWRITER").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        })
    }
}
