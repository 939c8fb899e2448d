//! Dialogue stage: conversation history and the completion round trip

pub mod completion;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use completion::{CompletionRequest, CompletionService, GroqClient};

use crate::Result;

/// Fixed system prompt, always the first history entry
pub const SYSTEM_PROMPT: &str = "You are a voice-based AI assistant. \
Always speak in plain, natural English. \
Your responses should be a summary, concise, clear, and easy to understand. \
Avoid complex vocabulary, jargon, or technical terms. \
Never use markdown, symbols like *, punctuation-based formatting, emojis, lists, or special characters like *, -, :, etc. \
Respond as if you're speaking clearly to a human through voice, not writing.";

/// Number of most recent history entries sent with each request
///
/// The window ignores roles, so the system prompt falls out of it once the
/// history holds more than six entries.
pub const HISTORY_WINDOW: usize = 6;

/// Sampling temperature
pub const TEMPERATURE: f32 = 0.7;

/// Reply length cap, in tokens
pub const MAX_TOKENS: u32 = 100;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered log of messages exchanged with the language model
///
/// Starts with the system prompt and only grows until [`reset`](Self::reset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    /// A fresh history holding only the system prompt
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: vec![Message::new(Role::System, SYSTEM_PROMPT)],
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system prompt is never removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent `n` entries, in insertion order
    #[must_use]
    pub fn window(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Replace everything with a single fresh system prompt
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::new(Role::System, SYSTEM_PROMPT));
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Drives completions against a [`CompletionService`]
pub struct Dialogue {
    service: Arc<dyn CompletionService>,
    model: String,
}

impl Dialogue {
    #[must_use]
    pub fn new(service: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Record `user_text`, ask for a reply and record it
    ///
    /// Returns the reply verbatim (trimmed, markup intact). On failure the user
    /// entry stays in the history and no assistant entry is added.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Service`] if the completion call fails
    pub async fn respond(
        &self,
        history: &mut ConversationHistory,
        user_text: &str,
    ) -> Result<String> {
        history.push(Message::new(Role::User, user_text));

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: history.window(HISTORY_WINDOW).to_vec(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let reply = self.service.complete(&request).await?;
        let reply = reply.trim().to_string();
        tracing::info!(reply = %reply, "LLM reply");

        history.push(Message::new(Role::Assistant, reply.clone()));
        Ok(reply)
    }
}
