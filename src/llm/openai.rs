//! OpenAI-compatible chat completions connector
//!
//! Serves OpenAI directly and any provider speaking the same wire format;
//! the factory points DeepSeek here with a different base URL.

use crate::constants::SYSTEM_PRIMER;
use crate::llm::http::send_json;
use crate::llm::{Completion, Connector, ConnectorError, ModelParams, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// Connector for OpenAI-compatible chat completion APIs.
#[derive(Debug)]
pub struct OpenAiConnector {
    api_key: String,
    model: String,
    base_url: String,
    provider_label: String,
    client: reqwest::Client,
}

impl OpenAiConnector {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, OPENAI_API_BASE, "openai")
    }

    /// Build a connector against a different OpenAI-compatible endpoint.
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: impl Into<String>,
        provider_label: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.into(),
            provider_label: provider_label.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str, params: &ModelParams) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PRIMER,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            seed: params.seed,
        }
    }
}

#[async_trait]
impl Connector for OpenAiConnector {
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<Completion, ConnectorError> {
        let request = self.build_request(prompt, params);
        let url = format!("{}/chat/completions", self.base_url);

        let started = Instant::now();
        let response: ChatCompletionResponse = send_json(
            self.client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request),
            &self.provider_label,
        )
        .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ConnectorError::InvalidResponse {
                provider: self.provider_label.clone(),
                message: "no choices returned".to_string(),
            })?;

        let usage = match response.usage {
            Some(api) => Usage {
                prompt_tokens: api.prompt_tokens.unwrap_or(0),
                completion_tokens: api.completion_tokens.unwrap_or(0),
                total_tokens: api.total_tokens.unwrap_or(0),
                latency_ms,
            },
            None => Usage {
                // Rough estimate when the provider omits usage.
                completion_tokens: (text.len() / 4) as u64,
                total_tokens: (text.len() / 4) as u64,
                latency_ms,
                ..Usage::default()
            },
        };

        Ok(Completion { text, usage })
    }

    fn provider(&self) -> &str {
        &self.provider_label
    }

    fn model(&self) -> &str {
        &self.model
    }
}
