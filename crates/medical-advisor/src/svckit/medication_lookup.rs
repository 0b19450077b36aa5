//! Medication Lookup Tool
//!
//! Over-the-counter options for a condition, filtered by severity and the
//! patient's contraindications. Every answer carries the disclaimer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use agent_core::tool::{string_arg, string_list_arg, u64_arg, ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{Result as CoreResult, Tool, ToolGroup};

use crate::error::AdvisorError;

pub const DISCLAIMER: &str = "This is general information about over-the-counter products, not a prescription. \
Read the label, check with a pharmacist or doctor before use, and do not exceed the stated dose.";

struct Medication {
    name: &'static str,
    category: &'static str,
    /// Condition keywords this product relieves
    treats: &'static [&'static str],
    /// Contraindication keywords that exclude it
    avoid_with: &'static [&'static str],
    /// Youngest age in years
    min_age: u64,
    note: &'static str,
}

const CATALOGUE: &[Medication] = &[
    Medication {
        name: "Paracetamol (acetaminophen)",
        category: "pain relief / fever",
        treats: &["pain", "fever", "headache", "cold", "flu", "influenza", "sore throat", "aches"],
        avoid_with: &["liver disease", "liver", "alcohol"],
        min_age: 0,
        note: "Gentle on the stomach. Check other cold remedies do not also contain paracetamol.",
    },
    Medication {
        name: "Ibuprofen",
        category: "anti-inflammatory pain relief",
        treats: &["pain", "fever", "headache", "aches", "sprain", "inflammation", "period pain"],
        avoid_with: &["kidney disease", "kidney", "stomach ulcer", "ulcer", "asthma", "pregnancy", "pregnant", "nsaid allergy", "blood thinner", "warfarin"],
        min_age: 1,
        note: "Take with food.",
    },
    Medication {
        name: "Aspirin",
        category: "pain relief",
        treats: &["pain", "headache", "aches"],
        avoid_with: &["stomach ulcer", "ulcer", "asthma", "pregnancy", "pregnant", "aspirin allergy", "nsaid allergy", "blood thinner", "warfarin", "bleeding"],
        min_age: 16,
        note: "Never give to children under 16.",
    },
    Medication {
        name: "Cetirizine",
        category: "antihistamine",
        treats: &["allergy", "hay fever", "hives", "itch", "itchy", "rash", "sneezing"],
        avoid_with: &["kidney disease", "kidney"],
        min_age: 2,
        note: "Can cause mild drowsiness.",
    },
    Medication {
        name: "Loratadine",
        category: "antihistamine",
        treats: &["allergy", "hay fever", "hives", "itch", "itchy", "sneezing"],
        avoid_with: &["liver disease", "liver"],
        min_age: 2,
        note: "Non-drowsy for most people.",
    },
    Medication {
        name: "Hydrocortisone 1% cream",
        category: "topical steroid",
        treats: &["eczema", "rash", "itch", "itchy", "insect bite", "dermatitis"],
        avoid_with: &["infected skin", "broken skin", "face"],
        min_age: 10,
        note: "Short courses only; not on the face or broken skin.",
    },
    Medication {
        name: "Oral rehydration salts",
        category: "rehydration",
        treats: &["diarrhea", "diarrhoea", "vomiting", "dehydration", "gastroenteritis", "stomach bug"],
        avoid_with: &["kidney failure"],
        min_age: 0,
        note: "Sip small amounts often.",
    },
    Medication {
        name: "Loperamide",
        category: "antidiarrheal",
        treats: &["diarrhea", "diarrhoea"],
        avoid_with: &["blood in stool", "fever", "bloody diarrhea", "pregnancy", "pregnant"],
        min_age: 12,
        note: "Not for diarrhoea with blood or fever.",
    },
    Medication {
        name: "Calcium carbonate antacid",
        category: "antacid",
        treats: &["heartburn", "indigestion", "acid reflux", "reflux"],
        avoid_with: &["kidney disease", "kidney stones"],
        min_age: 12,
        note: "Relieves symptoms for a few hours.",
    },
    Medication {
        name: "Saline nasal spray",
        category: "decongestant (non-medicated)",
        treats: &["blocked nose", "congestion", "cold", "runny nose"],
        avoid_with: &[],
        min_age: 0,
        note: "Safe for repeated use.",
    },
    Medication {
        name: "Honey and lemon",
        category: "home remedy",
        treats: &["cough", "sore throat", "cold"],
        avoid_with: &["diabetes"],
        min_age: 1,
        note: "Never give honey to babies under 1 year.",
    },
];

#[derive(Debug, Serialize)]
struct Suggestion {
    name: &'static str,
    category: &'static str,
    note: &'static str,
}

const DEFAULT_SEVERITY: &str = "moderate";

/// Tool looking up over-the-counter relief
#[derive(Debug, Default)]
pub struct MedicationLookupTool;

impl MedicationLookupTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for MedicationLookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "medication_lookup".into(),
            description: "List over-the-counter relief for a condition, excluding products that clash with the patient's contraindications. Returns medications, warnings and a disclaimer.".into(),
            parameters: vec![
                ParameterSchema::required("condition", "string", "Condition or main symptom, e.g. 'tension headache'"),
                ParameterSchema::optional("severity", "string", "Symptom severity")
                    .with_enum(vec!["mild".into(), "moderate".into(), "severe".into()])
                    .with_default(json!(DEFAULT_SEVERITY)),
                ParameterSchema::optional("contraindications", "array", "Allergies, conditions, pregnancy or current medication"),
                ParameterSchema::optional("age", "number", "Patient age in years"),
            ],
            group: ToolGroup::Medication,
        }
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let condition = string_arg(args, "condition")
            .ok_or_else(|| AdvisorError::InvalidArgument("condition must not be empty".into()))?;
        let severity = string_arg(args, "severity").unwrap_or(DEFAULT_SEVERITY);
        let contraindications: Vec<String> = string_list_arg(args, "contraindications")
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();
        let age = u64_arg(args, "age");

        Ok(lookup(condition, severity, &contraindications, age))
    }
}

fn lookup(condition: &str, severity: &str, contraindications: &[String], age: Option<u64>) -> Value {
    let condition_lower = condition.to_lowercase();
    let mut medications = Vec::new();
    let mut warnings = Vec::new();

    if severity.eq_ignore_ascii_case("severe") {
        warnings.push("Severe symptoms need assessment by a doctor before self-treatment.".to_string());
        return output(condition, &medications, warnings);
    }

    for med in CATALOGUE {
        if !med.treats.iter().any(|t| condition_lower.contains(t)) {
            continue;
        }

        let clash = contraindications
            .iter()
            .find(|c| med.avoid_with.iter().any(|a| c.contains(a) || a.contains(c.as_str())));
        if let Some(clash) = clash {
            warnings.push(format!("{} excluded: not suitable with {clash}.", med.name));
            continue;
        }

        if let Some(age) = age.filter(|a| *a < med.min_age) {
            warnings.push(format!("{} excluded: not for age {age} (minimum {}).", med.name, med.min_age));
            continue;
        }

        medications.push(Suggestion {
            name: med.name,
            category: med.category,
            note: med.note,
        });
    }

    if medications.is_empty() && warnings.is_empty() {
        warnings.push(format!("No over-the-counter product is listed for \"{condition}\". Ask a pharmacist."));
    }

    output(condition, &medications, warnings)
}

fn output(condition: &str, medications: &[Suggestion], warnings: Vec<String>) -> Value {
    json!({
        "condition": condition,
        "medications": medications,
        "warnings": warnings,
        "disclaimer": DISCLAIMER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(output: &Value) -> Vec<&str> {
        output["medications"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_severity_defaults_to_moderate() {
        let tool = MedicationLookupTool::new();
        let schema = tool.schema().to_json_schema();
        assert_eq!(schema["parameters"]["properties"]["severity"]["default"], DEFAULT_SEVERITY);

        let args = json!({"condition": "headache"});
        let output = tool.execute(args.as_object().unwrap()).await.unwrap();
        assert_eq!(output, lookup("headache", "moderate", &[], None));
    }

    #[test]
    fn test_headache_options() {
        let output = lookup("tension headache", "mild", &[], Some(35));
        assert_eq!(names(&output), vec!["Paracetamol (acetaminophen)", "Ibuprofen", "Aspirin"]);
        assert_eq!(output["disclaimer"], DISCLAIMER);
    }

    #[test]
    fn test_contraindications_exclude_with_warning() {
        let output = lookup("headache", "moderate", &["asthma".into(), "pregnant".into()], None);
        assert_eq!(names(&output), vec!["Paracetamol (acetaminophen)"]);

        let warnings = output["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].as_str().unwrap().starts_with("Ibuprofen excluded"));
    }

    #[test]
    fn test_age_limit() {
        let output = lookup("headache", "mild", &[], Some(10));
        assert!(!names(&output).contains(&"Aspirin"));
    }

    #[test]
    fn test_severe_returns_nothing_but_disclaimer() {
        let output = lookup("headache", "severe", &[], None);
        assert!(names(&output).is_empty());
        assert_eq!(output["disclaimer"], DISCLAIMER);
        assert!(output["warnings"][0].as_str().unwrap().contains("doctor"));
    }

    #[test]
    fn test_unknown_condition() {
        let output = lookup("broken toe nail", "mild", &[], None);
        assert!(names(&output).is_empty());
        assert_eq!(output["disclaimer"], DISCLAIMER);
    }

    #[tokio::test]
    async fn test_tool_requires_condition() {
        assert!(MedicationLookupTool::new().execute(&ToolArgs::new()).await.is_err());
    }
}
