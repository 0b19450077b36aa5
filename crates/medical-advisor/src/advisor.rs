//! Advisor Builder
//!
//! Wires a specialty and a capability selection into a ready
//! [`ConsultationEngine`].

use std::sync::Arc;
use std::time::Duration;

use agent_core::provider::{GenerationOptions, LlmProvider};
use agent_core::{ConsultationEngine, EngineBuilder, Result as CoreResult};

use crate::capability::{build_registry, Capability, CapabilityContext};
use crate::specialty::{Specialty, DIAGNOSIS_PROMPT};

pub struct AdvisorBuilder {
    provider: Arc<dyn LlmProvider>,
    specialty: Specialty,
    capabilities: Vec<Capability>,
    generation: GenerationOptions,
    llm_rewriter: bool,
    engine: EngineBuilder,
}

impl AdvisorBuilder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            specialty: Specialty::General,
            capabilities: Capability::ALL.to_vec(),
            generation: GenerationOptions::default(),
            llm_rewriter: false,
            engine: EngineBuilder::new(),
        }
    }

    pub fn specialty(mut self, specialty: Specialty) -> Self {
        self.specialty = specialty;
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Model used for reasoning, synthesis and the provider-backed tools
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.generation.temperature = temp;
        self
    }

    /// Rewrite weak knowledge queries with the provider
    pub fn llm_rewriter(mut self, enabled: bool) -> Self {
        self.llm_rewriter = enabled;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.engine = self.engine.max_iterations(max);
        self
    }

    pub fn history_window(mut self, n: usize) -> Self {
        self.engine = self.engine.history_window(n);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.engine = self.engine.max_concurrency(n);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.engine = self.engine.tool_timeout(timeout);
        self
    }

    pub fn build(self) -> CoreResult<ConsultationEngine> {
        let mut ctx = CapabilityContext::new(self.provider.clone(), self.generation.clone(), self.specialty);
        if self.llm_rewriter {
            ctx = ctx.with_llm_rewriter();
        }
        let registry = build_registry(&self.capabilities, &ctx);

        tracing::info!(
            specialty = %self.specialty,
            model = %self.generation.model,
            tools = ?registry.names(),
            "Building consultation engine"
        );

        self.engine
            .provider(self.provider)
            .tools(registry)
            .system_prompt(self.specialty.system_prompt())
            .diagnosis_prompt(DIAGNOSIS_PROMPT)
            .model(self.generation.model)
            .temperature(self.generation.temperature)
            .build()
    }
}
