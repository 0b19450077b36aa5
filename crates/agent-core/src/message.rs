//! Conversation Messages
//!
//! Rich in-memory messages used while a turn is running, and the plain
//! `{role, content}` form they are reduced to between turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Base64-encoded image attachments (vision requests only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Tool call ID (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
            timestamp: Utc::now(),
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = tool_call_id;
        msg
    }

    /// Attach a base64 image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Reduce to the storage-neutral form
    pub fn to_plain(&self) -> PlainMessage {
        PlainMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Storage-neutral `{role, content}` pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainMessage {
    pub role: Role,
    pub content: String,
}

impl From<PlainMessage> for Message {
    fn from(plain: PlainMessage) -> Self {
        Message::new(plain.role, plain.content)
    }
}

/// Append-only conversation history
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent `n` user/assistant messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let dialogue: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .collect();
        let skip = dialogue.len().saturating_sub(n);
        dialogue.into_iter().skip(skip).cloned().collect()
    }

    /// Reduce every message to its plain form
    pub fn to_plain(&self) -> Vec<PlainMessage> {
        self.messages.iter().map(Message::to_plain).collect()
    }

    /// Rebuild from plain messages
    pub fn from_plain(messages: Vec<PlainMessage>) -> Self {
        Self {
            messages: messages.into_iter().map(Message::from).collect(),
        }
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.images.is_empty());
    }

    #[test]
    fn test_recent_skips_tool_messages() {
        let mut conv = Conversation::new();
        conv.push(Message::user("one"));
        conv.push(Message::assistant("two"));
        conv.push(Message::tool("{}", None));
        conv.push(Message::user("three"));

        let recent = conv.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "two");
        assert_eq!(recent[1].content, "three");
    }

    #[test]
    fn test_plain_drops_attachments() {
        let mut conv = Conversation::new();
        conv.push(Message::user("look at this").with_image("aGVsbG8="));

        let plain = conv.to_plain();
        assert_eq!(plain, vec![PlainMessage { role: Role::User, content: "look at this".into() }]);

        let rebuilt = Conversation::from_plain(plain);
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.messages()[0].images.is_empty());
    }
}
