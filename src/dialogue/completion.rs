//! Completion service client (OpenAI-compatible chat completions)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::Message;
use crate::{Error, Result};

/// One chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Produces an assistant reply for a list of messages
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run one completion and return the reply text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] on network, auth, quota or response errors
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Groq (or any OpenAI-compatible) chat completions client
///
/// Requests are not retried and carry no timeout.
pub struct GroqClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl GroqClient {
    /// Create a new client for `base_url` (e.g. `https://api.groq.com/openai/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, base_url: &str) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("GROQ_API_KEY required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Service(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Service(format!("completion API error {status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Service(format!("failed to parse completion response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Service("completion returned no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::Role;

    #[test]
    fn test_request_wire_format() {
        let request = CompletionRequest {
            model: "llama3-8b-8192".to_string(),
            messages: vec![Message::new(Role::User, "hi there")],
            temperature: 0.7,
            max_tokens: 100,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3-8b-8192");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi there");
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_client_requires_key() {
        let result = GroqClient::new(SecretString::from(String::new()), "http://localhost");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
