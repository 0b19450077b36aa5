//! Image Analysis Tool
//!
//! Sends an uploaded photo to a vision-capable provider and decodes its
//! findings. Missing, malformed or non-medical images are reported as
//! "not applicable" instead of failing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_core::decision::extract_json_object;
use agent_core::provider::{GenerationOptions, LlmProvider, ToolChoice};
use agent_core::tool::{string_arg, ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{Message, Result as CoreResult, Tool, ToolGroup};

use crate::error::AdvisorError;
use crate::specialty::Specialty;

const VISION_PROMPT: &str = r#"You are assisting a medical consultation. Describe what the attached photo shows that is medically relevant.
Answer with one JSON object only:
{"applicable": true | false,
 "reason": "why the image cannot be assessed (only when applicable is false)",
 "description": "plain description of the visible area",
 "findings": ["visible feature", "..."],
 "confidence": "low" | "medium" | "high",
 "recommendation": "what the patient should do next"}
Set applicable to false when the image does not show a body part or is too unclear to assess. Never state a definitive diagnosis."#;

/// Tool analyzing a patient photo
pub struct ImageAnalyzerTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    specialty: Specialty,
}

impl ImageAnalyzerTool {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions, specialty: Specialty) -> Self {
        Self {
            provider,
            options: options.with_tool_choice(ToolChoice::None),
            specialty,
        }
    }
}

fn not_applicable(reason: &str) -> Value {
    json!({
        "applicable": false,
        "reason": reason,
        "findings": [],
    })
}

/// Strip a data-URL prefix and check the payload looks like base64
fn normalize_image(raw: &str) -> Option<&str> {
    let data = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:image/") => data,
        Some(_) => return None,
        None => raw,
    }
    .trim();

    let valid = data.len() >= 16
        && data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '\n' | '\r'));
    valid.then_some(data)
}

#[async_trait]
impl Tool for ImageAnalyzerTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "image_analysis".into(),
            description: "Analyze the photo the patient uploaded (skin, wound, swelling, eye...). The image is attached automatically; describe what to look for in 'context'.".into(),
            parameters: vec![
                ParameterSchema::optional("context", "string", "What the patient says the photo shows"),
                ParameterSchema::optional("body_part", "string", "Body area in the photo"),
            ],
            group: ToolGroup::Image,
        }
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let Some(raw) = string_arg(args, "image") else {
            return Ok(not_applicable("no image was provided"));
        };
        let Some(image) = normalize_image(raw) else {
            return Ok(not_applicable("the attachment is not a supported image"));
        };

        let mut request = format!("Specialty: {}", self.specialty);
        if let Some(context) = string_arg(args, "context") {
            request.push_str(&format!("\nPatient description: {context}"));
        }
        if let Some(part) = string_arg(args, "body_part") {
            request.push_str(&format!("\nBody area: {part}"));
        }

        let messages = [
            Message::system(VISION_PROMPT),
            Message::user(request).with_image(image),
        ];

        let completion = self
            .provider
            .complete(&messages, &[], &self.options)
            .await
            .map_err(|e| AdvisorError::ImageAnalysis(e.to_string()))?;

        let Some(mut analysis) = extract_json_object(&completion.content) else {
            tracing::debug!("Vision answer had no JSON object, keeping raw description");
            return Ok(json!({
                "applicable": true,
                "description": completion.content.trim(),
                "findings": [],
                "confidence": "low",
            }));
        };

        let applicable = analysis.get("applicable").and_then(Value::as_bool).unwrap_or(true);
        if !applicable {
            let reason = analysis
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("the image does not show anything that can be assessed");
            return Ok(not_applicable(reason));
        }

        analysis["applicable"] = json!(true);
        if !analysis.get("findings").is_some_and(Value::is_array) {
            analysis["findings"] = json!([]);
        }
        Ok(analysis)
    }
}
