//! # medical-advisor
//!
//! Medical consultation capabilities for the agent engine: knowledge
//! lookup, rule-based risk scoring, vision-backed image analysis,
//! over-the-counter medication guidance and clinician dossiers.
//!
//! ## Safety Model
//!
//! - **Triage first** - risk scoring is deterministic and an emergency
//!   combination always wins over the score
//! - **No prescriptions** - medication answers are filtered by
//!   contraindications and always carry a disclaimer
//! - **Honest gaps** - lookups and image analysis report "not found" or
//!   "not applicable" rather than guessing
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Capability              Group        Runs                 │
//! ├────────────────────────────────────────────────────────────┤
//! │  knowledge_lookup        knowledge    serial (shared index)│
//! │  enhanced_knowledge_...  knowledge    serial (shared index)│
//! │  image_analysis          image        serial (vision model)│
//! │  risk_scoring            risk         parallel             │
//! │  medication_lookup       medication   parallel             │
//! │  generate_dossier        dossier      parallel             │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod advisor;
pub mod capability;
pub mod error;
pub mod knowledge;
pub mod specialty;
pub mod svckit;

pub use advisor::AdvisorBuilder;
pub use capability::{build_registry, Capability, CapabilityContext};
pub use error::{AdvisorError, Result};
pub use specialty::{Specialty, DIAGNOSIS_PROMPT, MEDICAL_ADVISOR_PROMPT};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        DossierTool,
        EnhancedKnowledgeLookupTool,
        ImageAnalyzerTool,
        KnowledgeLookupTool,
        MedicationLookupTool,
        RiskScorerTool,
    };
}
