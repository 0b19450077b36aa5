//! Dossier Tool
//!
//! Formats the collected facts into a handover document for a clinician.
//! Pure formatting: no lookups, no provider calls.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use agent_core::tool::{string_arg, string_list_arg, ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{MedicalContext, Result as CoreResult, Tool, ToolGroup};

use crate::error::AdvisorError;
use crate::specialty::Specialty;

#[derive(Debug, Serialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dossier {
    pub id: String,
    pub timestamp: String,
    pub specialty: Specialty,
    pub sections: Vec<Section>,
    /// Plain-text rendering of all sections
    pub text: String,
}

/// Tool producing the consultation dossier
pub struct DossierTool {
    specialty: Specialty,
}

impl DossierTool {
    pub fn new(specialty: Specialty) -> Self {
        Self { specialty }
    }
}

#[async_trait]
impl Tool for DossierTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "generate_dossier".into(),
            description: "Produce the final consultation dossier for a clinician once the assessment is complete. Collected facts and risk level are attached automatically.".into(),
            parameters: vec![
                ParameterSchema::optional("summary", "string", "One-paragraph summary of the consultation"),
                ParameterSchema::optional("assessment", "string", "Likely explanations discussed with the patient"),
                ParameterSchema::optional("recommendations", "array", "Agreed next steps"),
            ],
            group: ToolGroup::Dossier,
        }
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let context: MedicalContext = match args.get("context") {
            Some(value) => serde_json::from_value(value.clone()).map_err(AdvisorError::from)?,
            None => MedicalContext::default(),
        };

        let dossier = build(
            self.specialty,
            &context,
            string_arg(args, "riskLevel").unwrap_or("unassessed"),
            string_arg(args, "summary"),
            string_arg(args, "assessment"),
            &string_list_arg(args, "recommendations"),
        );
        tracing::info!(id = %dossier.id, sections = dossier.sections.len(), "Dossier generated");

        Ok(serde_json::to_value(dossier)?)
    }
}

fn bullet_list(items: &[String]) -> String {
    items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
}

fn build(
    specialty: Specialty,
    context: &MedicalContext,
    risk_level: &str,
    summary: Option<&str>,
    assessment: Option<&str>,
    recommendations: &[String],
) -> Dossier {
    let mut sections = Vec::new();
    let mut push = |title: &str, content: String| {
        if !content.trim().is_empty() {
            sections.push(Section {
                title: title.into(),
                content,
            });
        }
    };

    push("Summary", summary.unwrap_or_default().to_string());

    let mut complaint = bullet_list(&context.symptoms);
    if !context.duration.is_empty() {
        complaint.push_str(&format!("\nDuration: {}", context.duration));
    }
    if !context.severity.is_empty() {
        complaint.push_str(&format!("\nSeverity: {}", context.severity));
    }
    push("Presenting Complaint", complaint.trim().to_string());
    push("Triggers", bullet_list(&context.triggers));
    push("Medical History", bullet_list(&context.history));
    push(
        "Patient Details",
        context
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    push("Risk Level", risk_level.to_string());
    push("Assessment", assessment.unwrap_or_default().to_string());
    push("Recommendations", bullet_list(recommendations));

    let timestamp = Utc::now().to_rfc3339();
    let mut text = format!("CONSULTATION DOSSIER ({specialty})\nGenerated: {timestamp}\n");
    for section in &sections {
        text.push_str(&format!("\n## {}\n{}\n", section.title, section.content));
    }

    Dossier {
        id: Uuid::new_v4().to_string(),
        timestamp,
        specialty,
        sections,
        text,
    }
}

/// Turn the dossier value back into a title → content map
pub fn section_map(dossier: &Value) -> Map<String, Value> {
    dossier
        .get("sections")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|s| Some((s.get("title")?.as_str()?.to_string(), s.get("content")?.clone())))
        .collect()
}
