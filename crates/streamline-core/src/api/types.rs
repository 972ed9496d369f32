//! Chat Completions wire types.

use serde::{Deserialize, Serialize};

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A request for one completion.
///
/// The client renders the JSON body itself, filling in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model identifier.  Empty means the client's default model.
    pub model: String,

    /// The conversation history.
    pub messages: Vec<Message>,

    /// Completion token limit; falls back to the client default.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Whether to request an SSE stream.
    pub stream: bool,
}

impl ChatRequest {
    /// A streaming request for `messages` on the default model.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: String::new(),
            messages,
            max_tokens: None,
            temperature: None,
            stream: true,
        }
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request a streamed (`true`) or whole (`false`) response.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
