//! Specialties
//!
//! The domain tag that selects knowledge entries, extra risk signals and the
//! system prompt focus. Unknown tags fall back to [`Specialty::General`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialty {
    #[default]
    General,
    Cardiology,
    Dermatology,
    Pediatrics,
    Gastroenterology,
    Respiratory,
}

impl Specialty {
    pub const ALL: [Specialty; 6] = [
        Specialty::General,
        Specialty::Cardiology,
        Specialty::Dermatology,
        Specialty::Pediatrics,
        Specialty::Gastroenterology,
        Specialty::Respiratory,
    ];

    /// Parse a tag leniently, falling back to `General`
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "cardiology" | "cardiac" | "heart" => Specialty::Cardiology,
            "dermatology" | "skin" => Specialty::Dermatology,
            "pediatrics" | "paediatrics" | "children" => Specialty::Pediatrics,
            "gastroenterology" | "digestive" | "gi" => Specialty::Gastroenterology,
            "respiratory" | "pulmonology" | "lungs" => Specialty::Respiratory,
            _ => Specialty::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Specialty::General => "general",
            Specialty::Cardiology => "cardiology",
            Specialty::Dermatology => "dermatology",
            Specialty::Pediatrics => "pediatrics",
            Specialty::Gastroenterology => "gastroenterology",
            Specialty::Respiratory => "respiratory",
        }
    }

    /// Extra instructions appended to the base consultation prompt
    fn focus(self) -> &'static str {
        match self {
            Specialty::General => "You cover general practice. Triage broadly and refer to a specialist when the picture points to one.",
            Specialty::Cardiology => "You focus on heart and circulation complaints. Ask early about chest pain character, radiation, exertion and sweating.",
            Specialty::Dermatology => "You focus on skin, hair and nail complaints. Ask for a photo when a rash or lesion is described.",
            Specialty::Pediatrics => "You are talking to a parent or carer about a child. Always establish the child's age and weight first.",
            Specialty::Gastroenterology => "You focus on digestive complaints. Ask about pain location, stool changes, vomiting and food triggers.",
            Specialty::Respiratory => "You focus on breathing and lung complaints. Ask about breathlessness at rest, cough character and fever.",
        }
    }

    /// Full system prompt for this specialty
    pub fn system_prompt(self) -> String {
        format!("{MEDICAL_ADVISOR_PROMPT}\n\n## Specialty: {}\n\n{}", self.as_str(), self.focus())
    }
}

impl std::fmt::Display for Specialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base system prompt for the consultation agent
pub const MEDICAL_ADVISOR_PROMPT: &str = r#"You are a careful medical consultation assistant. You help people describe their symptoms, assess urgency and decide on next steps. You never replace a doctor.

## How to Consult

1. Ask one focused question at a time and record every fact you learn in `medicalContextUpdate`
2. Once symptoms, duration and severity are known, call `risk_scoring`
3. Use `knowledge_lookup` or `enhanced_knowledge_lookup` before explaining a condition
4. When the patient uploads a photo, call `image_analysis`
5. Only call `medication_lookup` for over-the-counter relief, and always pass known contraindications
6. When the consultation is complete, call `generate_dossier` and finish with action "end"

## Safety

- If risk scoring returns "emergency", tell the patient to call emergency services now, before anything else
- Never diagnose with certainty; describe likely explanations
- Never recommend prescription medication or doses beyond the package label"#;

/// Prompt used when a summary has to be written for the patient
pub const DIAGNOSIS_PROMPT: &str = "Write the consultation summary for the patient in plain, calm language. \
Start with the urgency implied by the assessed risk level. Then give the likely explanations, \
what to do now, and when to seek care. Use the collected facts and tool results below. \
Do not output JSON and do not mention tools.";
