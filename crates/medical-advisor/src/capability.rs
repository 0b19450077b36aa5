//! Capabilities
//!
//! The closed set of tools a consultation can use. Names are resolved here,
//! at the configuration boundary, so an unknown name fails at startup rather
//! than in the middle of a turn.

use std::str::FromStr;
use std::sync::Arc;

use agent_core::provider::{GenerationOptions, LlmProvider};
use agent_core::{Tool, ToolGroup, ToolRegistry};

use crate::error::{AdvisorError, Result};
use crate::specialty::Specialty;
use crate::svckit::{
    DossierTool, EnhancedKnowledgeLookupTool, ImageAnalyzerTool, KnowledgeLookupTool, LlmQueryRewriter,
    MedicationLookupTool, QueryRewriter, RiskScorerTool, SynonymRewriter,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    KnowledgeLookup,
    EnhancedKnowledgeLookup,
    RiskScoring,
    ImageAnalysis,
    MedicationLookup,
    DossierGeneration,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::KnowledgeLookup,
        Capability::EnhancedKnowledgeLookup,
        Capability::RiskScoring,
        Capability::ImageAnalysis,
        Capability::MedicationLookup,
        Capability::DossierGeneration,
    ];

    /// Tool name the provider calls
    pub fn name(self) -> &'static str {
        match self {
            Capability::KnowledgeLookup => "knowledge_lookup",
            Capability::EnhancedKnowledgeLookup => "enhanced_knowledge_lookup",
            Capability::RiskScoring => "risk_scoring",
            Capability::ImageAnalysis => "image_analysis",
            Capability::MedicationLookup => "medication_lookup",
            Capability::DossierGeneration => "generate_dossier",
        }
    }

    pub fn group(self) -> ToolGroup {
        match self {
            Capability::KnowledgeLookup | Capability::EnhancedKnowledgeLookup => ToolGroup::Knowledge,
            Capability::RiskScoring => ToolGroup::Risk,
            Capability::ImageAnalysis => ToolGroup::Image,
            Capability::MedicationLookup => ToolGroup::Medication,
            Capability::DossierGeneration => ToolGroup::Dossier,
        }
    }

    /// Parse a comma-separated list; empty input selects every capability
    pub fn parse_list(list: &str) -> Result<Vec<Capability>> {
        let mut selected = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let capability: Capability = name.parse()?;
            if !selected.contains(&capability) {
                selected.push(capability);
            }
        }
        if selected.is_empty() {
            selected.extend(Capability::ALL);
        }
        Ok(selected)
    }

    /// Instantiate the tool
    pub fn build(self, ctx: &CapabilityContext) -> Arc<dyn Tool> {
        match self {
            Capability::KnowledgeLookup => Arc::new(KnowledgeLookupTool::new(ctx.specialty)),
            Capability::EnhancedKnowledgeLookup => Arc::new(EnhancedKnowledgeLookupTool::new(
                ctx.specialty,
                ctx.rewriter.clone(),
            )),
            Capability::RiskScoring => Arc::new(RiskScorerTool::new(ctx.specialty)),
            Capability::ImageAnalysis => Arc::new(ImageAnalyzerTool::new(
                ctx.provider.clone(),
                ctx.generation.clone(),
                ctx.specialty,
            )),
            Capability::MedicationLookup => Arc::new(MedicationLookupTool::new()),
            Capability::DossierGeneration => Arc::new(DossierTool::new(ctx.specialty)),
        }
    }
}

impl FromStr for Capability {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AdvisorError::UnknownCapability(s.trim().to_string()))
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the capabilities need to be constructed
pub struct CapabilityContext {
    pub provider: Arc<dyn LlmProvider>,
    pub generation: GenerationOptions,
    pub specialty: Specialty,
    pub rewriter: Arc<dyn QueryRewriter>,
}

impl CapabilityContext {
    /// Context using the deterministic synonym rewriter
    pub fn new(provider: Arc<dyn LlmProvider>, generation: GenerationOptions, specialty: Specialty) -> Self {
        Self {
            provider,
            generation,
            specialty,
            rewriter: Arc::new(SynonymRewriter),
        }
    }

    /// Rewrite weak knowledge queries with the provider instead
    pub fn with_llm_rewriter(mut self) -> Self {
        self.rewriter = Arc::new(LlmQueryRewriter::new(self.provider.clone(), self.generation.clone()));
        self
    }
}

/// Registry holding the selected capabilities
pub fn build_registry(capabilities: &[Capability], ctx: &CapabilityContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for capability in capabilities {
        registry.register_boxed(capability.build(ctx));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;

    fn ctx() -> CapabilityContext {
        CapabilityContext::new(
            Arc::new(ScriptedProvider::new()),
            GenerationOptions::default(),
            Specialty::General,
        )
    }

    #[test]
    fn test_every_capability_builds_matching_tool() {
        let ctx = ctx();
        for capability in Capability::ALL {
            let schema = capability.build(&ctx).schema();
            assert_eq!(schema.name, capability.name());
            assert_eq!(schema.group, capability.group());
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert_eq!("Risk_Scoring".parse::<Capability>().unwrap(), Capability::RiskScoring);
        assert!(matches!(
            "diagnose_everything".parse::<Capability>(),
            Err(AdvisorError::UnknownCapability(name)) if name == "diagnose_everything"
        ));
        assert!(Capability::parse_list("risk_scoring, teleport").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(Capability::parse_list("").unwrap().len(), 6);
        assert_eq!(
            Capability::parse_list("risk_scoring,generate_dossier,risk_scoring").unwrap(),
            vec![Capability::RiskScoring, Capability::DossierGeneration]
        );
    }

    #[test]
    fn test_registry_contains_selection() {
        let registry = build_registry(&[Capability::RiskScoring, Capability::KnowledgeLookup], &ctx());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.group_of("knowledge_lookup"), ToolGroup::Knowledge);
        assert!(registry.get("image_analysis").is_none());
    }
}
