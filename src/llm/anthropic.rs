//! Anthropic Claude messages API connector

use crate::constants::SYSTEM_PRIMER;
use crate::llm::http::send_json;
use crate::llm::{Completion, Connector, ConnectorError, ModelParams, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic requires max_tokens; used when the character sets none.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
    system: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Connector for Anthropic's messages API.
#[derive(Debug)]
pub struct AnthropicConnector {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicConnector {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str, params: &ModelParams) -> MessageRequest<'a> {
        MessageRequest {
            model: &self.model,
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            system: SYSTEM_PRIMER,
            temperature: params.temperature,
            top_p: params.top_p,
        }
    }
}

#[async_trait]
impl Connector for AnthropicConnector {
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<Completion, ConnectorError> {
        let request = self.build_request(prompt, params);

        let started = Instant::now();
        let response: MessageResponse = send_json(
            self.client
                .post(API_URL)
                .header("Content-Type", "application/json")
                .header("X-Api-Key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request),
            "anthropic",
        )
        .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = response
            .content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| ConnectorError::InvalidResponse {
                provider: "anthropic".to_string(),
                message: "no text content returned".to_string(),
            })?;

        let usage = match response.usage {
            Some(api) => Usage {
                prompt_tokens: api.input_tokens,
                completion_tokens: api.output_tokens,
                total_tokens: api.input_tokens + api.output_tokens,
                latency_ms,
            },
            None => Usage {
                latency_ms,
                ..Usage::default()
            },
        };

        Ok(Completion { text, usage })
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
