//! Service Kit - Agent Tools
//!
//! Consultation capabilities implementing `agent_core::Tool`. They return
//! data only; the engine decides what to record in the session.

mod dossier;
mod image_analyzer;
mod knowledge_lookup;
mod medication_lookup;
mod risk_scorer;

pub use dossier::{section_map, Dossier, DossierTool, Section};
pub use image_analyzer::ImageAnalyzerTool;
pub use knowledge_lookup::{
    EnhancedKnowledgeLookupTool, KnowledgeLookupTool, LlmQueryRewriter, QueryRewriter, SynonymRewriter,
};
pub use medication_lookup::{MedicationLookupTool, DISCLAIMER};
pub use risk_scorer::{assess, RiskAssessment, RiskScorerTool};
