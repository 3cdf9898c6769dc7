use crate::config::DecisionBackendConfig;
use crate::domain::decision::BackendError;
use crate::domain::ports::DecisionBackend;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 320;

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Decision backend speaking the OpenAI chat completions protocol.
pub struct OpenAiBackend {
    client: Client,
    config: DecisionBackendConfig,
}

impl OpenAiBackend {
    pub fn new(config: DecisionBackendConfig) -> Result<Self, BackendError> {
        // Hard ceiling only; the decision engine applies the real deadline.
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DecisionBackend for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let payload = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("response has no choices".to_string()))?;

        content_text(choice.message.content)
    }
}

/// Message content is either a string or a list of typed text parts.
fn content_text(content: Value) -> Result<String, BackendError> {
    match content {
        Value::String(text) => Ok(text),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                Err(BackendError::Malformed("content has no text parts".to_string()))
            } else {
                Ok(text.join("\n"))
            }
        }
        other => Err(BackendError::Malformed(format!(
            "unexpected content: {}",
            other
        ))),
    }
}
