//! OpenAI-compatible chat completions client used for rationales.

use crate::config::RationaleConfig;
use crate::error::RationaleError;
use crate::sources::RationaleService;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str =
    "You are a concise equity analyst. Explain trading signals in plain language.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Rationale service backed by a `chat/completions` endpoint.
pub struct LlmRationaleService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmRationaleService {
    /// Build from config. Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &RationaleConfig) -> Result<Option<Self>, RationaleError> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        // The enricher applies its own shorter deadline; this only bounds a
        // request that outlives the enricher.
        let client = Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()?;

        Ok(Some(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }))
    }

    fn request<'a>(&'a self, prompt: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn first_choice(response: ChatResponse) -> Result<String, RationaleError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RationaleError::InvalidResponse("No choices in response".to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(RationaleError::InvalidResponse("Empty completion".to_string()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl RationaleService for LlmRationaleService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn explain(&self, prompt: &str) -> Result<String, RationaleError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting rationale from {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RationaleError::Service(format!("Status {}: {}", status, body)));
        }

        let parsed: ChatResponse = response.json().await?;
        first_choice(parsed)
    }
}
