//! Response Generator
//!
//! Produces the user-visible message for a turn. A ready-made decision
//! response is streamed as word groups; otherwise a summary is generated by
//! the provider and streamed through [`JsonStreamFilter`].

use futures::StreamExt;

use crate::decision::{parse_decision, AgentDecision};
use crate::error::Result;
use crate::events::EventSink;
use crate::message::Message;
use crate::provider::{LlmProvider, ToolChoice};
use crate::reasoning::{format_tool_results, AgentConfig};
use crate::state::SessionState;
use crate::stream::JsonStreamFilter;

/// Shown when synthesis yields no usable prose
const FALLBACK_MESSAGE: &str = "Thank you for the details. I could not put together a complete summary right now. \
If your symptoms get worse or feel severe, please seek medical care promptly.";

pub struct ResponseGenerator<'a> {
    provider: &'a dyn LlmProvider,
    config: &'a AgentConfig,
}

impl<'a> ResponseGenerator<'a> {
    pub fn new(provider: &'a dyn LlmProvider, config: &'a AgentConfig) -> Self {
        Self { provider, config }
    }

    /// Message for the terminal decision, streamed to `events`
    pub async fn generate(
        &self,
        state: &SessionState,
        decision: Option<&AgentDecision>,
        events: &EventSink,
    ) -> Result<String> {
        if let Some(text) = decision.and_then(AgentDecision::response_text) {
            let text = text.to_string();
            for chunk in word_chunks(&text, self.config.chunk_words) {
                events.chunk(chunk);
            }
            return Ok(text);
        }

        self.synthesize(state, events).await
    }

    /// Ask the provider for a summary of the consultation so far
    async fn synthesize(&self, state: &SessionState, events: &EventSink) -> Result<String> {
        let messages = self.build_messages(state);
        let options = self.config.generation.with_tool_choice(ToolChoice::None);

        let mut stream = self.provider.complete_stream(&messages, &options).await?;
        let mut filter = JsonStreamFilter::new();
        let mut raw = String::new();
        let mut message = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            raw.push_str(&chunk.delta);
            let text = filter.push(&chunk.delta);
            message.push_str(&text);
            events.chunk(text);
            if chunk.done {
                break;
            }
        }

        let tail = filter.finish();
        message.push_str(&tail);
        events.chunk(tail);

        let message = message.trim().to_string();
        if !message.is_empty() {
            return Ok(message);
        }

        // The provider answered only in JSON; salvage its response field.
        let salvaged = parse_decision(&raw)
            .ok()
            .and_then(|d| d.response_text().map(String::from))
            .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
        events.chunk(salvaged.clone());
        Ok(salvaged)
    }

    fn build_messages(&self, state: &SessionState) -> Vec<Message> {
        let mut prompt = self.config.diagnosis_prompt.clone();

        prompt.push_str(&format!("\n\n## Assessed Risk Level\n{}\n", state.risk_level));
        prompt.push_str("\n## Collected Facts\n");
        prompt.push_str(&serde_json::to_string(&state.medical_context).unwrap_or_default());
        prompt.push('\n');

        if !state.tool_results.is_empty() {
            prompt.push_str("\n## Tool Results\n");
            prompt.push_str(&format_tool_results(&state.tool_results));
        }

        let mut messages = vec![Message::system(prompt)];
        messages.extend(state.history.recent(self.config.history_window));
        messages
    }
}

/// Split text into chunks of `n` words, keeping the original spacing
fn word_chunks(text: &str, n: usize) -> Vec<String> {
    let n = n.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut words = 0;

    for piece in text.split_inclusive(char::is_whitespace) {
        current.push_str(piece);
        if !piece.trim().is_empty() {
            words += 1;
        }
        if words == n {
            chunks.push(std::mem::take(&mut current));
            words = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AgentEvent;
    use crate::mock::ScriptedProvider;
    use crate::session::SessionId;

    fn collect_chunks(mut rx: tokio::sync::mpsc::UnboundedReceiver<AgentEvent>) -> String {
        let mut text = String::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Chunk { text: t } = event {
                text.push_str(&t);
            }
        }
        text
    }

    #[test]
    fn test_word_chunks_preserve_text() {
        let text = "Please  rest and\ndrink plenty of fluids.";
        let chunks = word_chunks(text, 2);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.len() >= 3);
    }

    #[tokio::test]
    async fn test_ready_made_response_is_chunked() {
        let provider = ScriptedProvider::new();
        let config = AgentConfig::default();
        let generator = ResponseGenerator::new(&provider, &config);
        let state = SessionState::new(SessionId::new(), 3);
        let (sink, rx) = EventSink::channel();

        let decision = AgentDecision::respond("How long have you had this cough?");
        let message = generator.generate(&state, Some(&decision), &sink).await.unwrap();
        drop(sink);

        assert_eq!(message, "How long have you had this cough?");
        assert_eq!(collect_chunks(rx), message);
        assert_eq!(provider.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_synthesis_filters_json() {
        let provider = ScriptedProvider::new()
            .chunk_chars(5)
            .stream_reply(r#"You likely have a cold. {"action": "diagnose", "stage": "diagnosing"}Rest well."#);
        let config = AgentConfig::default();
        let generator = ResponseGenerator::new(&provider, &config);
        let state = SessionState::new(SessionId::new(), 3);
        let (sink, rx) = EventSink::channel();

        let message = generator.generate(&state, None, &sink).await.unwrap();
        drop(sink);

        assert_eq!(message, "You likely have a cold. Rest well.");
        assert_eq!(collect_chunks(rx), "You likely have a cold. Rest well.");
    }

    #[tokio::test]
    async fn test_json_only_synthesis_is_salvaged() {
        let provider = ScriptedProvider::new()
            .stream_reply(r#"{"action": "respond", "response": "Please see a GP this week."}"#);
        let config = AgentConfig::default();
        let generator = ResponseGenerator::new(&provider, &config);
        let state = SessionState::new(SessionId::new(), 3);

        let message = generator.generate(&state, None, &EventSink::discard()).await.unwrap();
        assert_eq!(message, "Please see a GP this week.");
    }

    #[tokio::test]
    async fn test_stream_failure_propagates() {
        let provider = ScriptedProvider::new().stream_fail("connection reset");
        let config = AgentConfig::default();
        let generator = ResponseGenerator::new(&provider, &config);
        let state = SessionState::new(SessionId::new(), 3);

        assert!(generator.generate(&state, None, &EventSink::discard()).await.is_err());
    }
}
