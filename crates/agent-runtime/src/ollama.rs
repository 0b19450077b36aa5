//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference. Tool schemas
//! are not sent natively; the engine describes tools in the system prompt and
//! parses ```` ```tool ```` blocks from the reply. Image attachments are
//! forwarded, so a vision model (llava, llama3.2-vision) can serve the image
//! capability.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider,
        ModelInfo, ProviderInfo, StreamChunk, TokenUsage,
    },
    tool::ToolSchema,
};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
        images::Image,
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

/// Model name fragments that indicate image support
const VISION_MODELS: &[&str] = &["vision", "llava", "bakllava", "moondream", "minicpm-v"];

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self { host, port }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Convert engine messages to Ollama format, images included
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                    Role::Tool => MessageRole::User, // Tools appear as user context
                };
                let message = ChatMessage::new(role, m.content.clone());
                if m.images.is_empty() {
                    message
                } else {
                    message.with_images(m.images.iter().map(|img| Image::from_base64(img.as_str())).collect())
                }
            })
            .collect()
    }

    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            tool_calls: Vec::new(),
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| TokenUsage {
                prompt_tokens: d.prompt_eval_count as u32,
                completion_tokens: d.eval_count as u32,
                total_tokens: (d.prompt_eval_count + d.eval_count) as u32,
            }),
            finish_reason: Some(FinishReason::Stop),
        }
    }

    fn build_request(messages: &[Message], opts: &GenerationOptions) -> ChatMessageRequest {
        let mut options = OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX));
        if !opts.stop_sequences.is_empty() {
            options = options.stop(opts.stop_sequences.clone());
        }

        ChatMessageRequest::new(opts.model.clone(), Self::convert_messages(messages)).options(options)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();
        let supports_vision = models.iter().any(|m| m.supports_vision);

        Ok(ProviderInfo {
            name: "Ollama".into(),
            models,
            supports_streaming: true,
            supports_tools: false,
            supports_vision,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(host = %self.config.host, port = self.config.port, "Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        if !tools.is_empty() {
            tracing::trace!(tools = tools.len(), "Tools described in prompt, not sent natively");
        }

        let response = self.client
            .send_chat_messages(Self::build_request(messages, options))
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self::convert_completion(response, &options.model))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let stream = self.client
            .send_chat_messages_stream(Self::build_request(messages, options))
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let mapped = stream.map(|result| {
            result
                .map(|chunk| StreamChunk {
                    delta: chunk.message.content,
                    done: chunk.done,
                    usage: chunk.final_data.as_ref().map(|d| TokenUsage {
                        prompt_tokens: d.prompt_eval_count as u32,
                        completion_tokens: d.eval_count as u32,
                        total_tokens: (d.prompt_eval_count + d.eval_count) as u32,
                    }),
                })
                .map_err(|_| AgentError::Provider("Ollama stream interrupted".into()))
        });

        Ok(Box::pin(mapped))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self.client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                supports_vision: is_vision_model(&m.name),
                name: m.name,
                context_length: None, // Not exposed by Ollama API
            })
            .collect())
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        // Llama tokenizer is roughly 4 chars per token
        u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
    }
}

fn is_vision_model(name: &str) -> bool {
    let name = name.to_lowercase();
    VISION_MODELS.iter().any(|v| name.contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
    }

    #[test]
    fn test_message_conversion_keeps_images() {
        let messages = vec![
            Message::system("You are a careful medical assistant."),
            Message::user("What is this rash?").with_image("aGVsbG8gd29ybGQ="),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 2);
        assert!(converted[0].images.is_none());
        assert_eq!(converted[1].images.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_vision_model_detection() {
        assert!(is_vision_model("llama3.2-vision:11b"));
        assert!(is_vision_model("LLaVA:7b"));
        assert!(!is_vision_model("llama3.2"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        // Nothing listens on the discard port.
        let provider = OllamaProvider::new("http://127.0.0.1", 9);
        assert!(!provider.health_check().await.unwrap());
    }
}
