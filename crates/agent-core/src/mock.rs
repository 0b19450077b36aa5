//! Scripted Provider
//!
//! For tests and demos. Replays a fixed script of completions and streamed
//! replies, and records every request it receives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
    ProviderInfo, StreamChunk,
};
use crate::tool::{ToolCall, ToolSchema};

#[derive(Clone, Debug)]
enum Reply {
    Text(String),
    Tools(Vec<ToolCall>),
    Fail(String),
}

/// Provider that answers from a script
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    repeat: Option<Reply>,
    streams: Mutex<VecDeque<Reply>>,
    stream_repeat: Option<Reply>,
    chunk_chars: usize,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            chunk_chars: 7,
            ..Default::default()
        }
    }

    /// Queue a text completion
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Reply::Text(text.into()))
    }

    /// Queue a native tool-call completion
    pub fn reply_tools(self, calls: Vec<ToolCall>) -> Self {
        self.push(Reply::Tools(calls))
    }

    /// Queue a provider failure
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Reply::Fail(message.into()))
    }

    /// Text returned once the completion script is exhausted
    pub fn repeat(mut self, text: impl Into<String>) -> Self {
        self.repeat = Some(Reply::Text(text.into()));
        self
    }

    /// Queue a streamed reply
    pub fn stream_reply(self, text: impl Into<String>) -> Self {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(Reply::Text(text.into()));
        }
        self
    }

    /// Queue a streaming failure
    pub fn stream_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(Reply::Fail(message.into()));
        }
        self
    }

    /// Streamed text returned once the stream script is exhausted
    pub fn stream_repeat(mut self, text: impl Into<String>) -> Self {
        self.stream_repeat = Some(Reply::Text(text.into()));
        self
    }

    /// Size of streamed chunks in characters
    pub fn chunk_chars(mut self, n: usize) -> Self {
        self.chunk_chars = n.max(1);
        self
    }

    /// Number of `complete` calls served
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Number of `complete_stream` calls served
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Messages of every request, in order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(self, reply: Reply) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    fn record(&self, messages: &[Message]) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
    }

    fn next(queue: &Mutex<VecDeque<Reply>>, repeat: Option<&Reply>) -> Result<Reply> {
        let queued = queue
            .lock()
            .map_err(|_| AgentError::Provider("script lock poisoned".into()))?
            .pop_front();
        queued
            .or_else(|| repeat.cloned())
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }

    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Scripted".into(),
            models: self.list_models().await?,
            supports_streaming: true,
            supports_tools: true,
            supports_vision: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages);

        match Self::next(&self.replies, self.repeat.as_ref())? {
            Reply::Text(text) => Ok(Completion {
                model: options.model.clone(),
                ..Completion::text(text)
            }),
            Reply::Tools(tool_calls) => Ok(Completion {
                tool_calls,
                model: options.model.clone(),
                finish_reason: Some(FinishReason::ToolUse),
                ..Default::default()
            }),
            Reply::Fail(message) => Err(AgentError::Provider(message)),
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages);

        let text = match Self::next(&self.streams, self.stream_repeat.as_ref())? {
            Reply::Text(text) => text,
            Reply::Tools(_) => String::new(),
            Reply::Fail(message) => return Err(AgentError::Provider(message)),
        };

        let pieces = self.split(&text);
        let last = pieces.len().saturating_sub(1);
        let chunks: Vec<Result<StreamChunk>> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, delta)| {
                Ok(StreamChunk {
                    delta,
                    done: i == last,
                    usage: None,
                })
            })
            .collect();

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            name: "scripted".into(),
            context_length: None,
            supports_vision: true,
        }])
    }
}
