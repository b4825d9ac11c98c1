//! Ollama local model connector
//!
//! Talks to a local Ollama daemon via `/api/generate`. No credentials;
//! the endpoint comes from `OLLAMA_API_BASE` or the default localhost port.

use crate::constants::SYSTEM_PRIMER;
use crate::llm::http::send_json;
use crate::llm::{Completion, Connector, ConnectorError, ModelParams, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// Connector for a local Ollama daemon.
#[derive(Debug)]
pub struct OllamaConnector {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaConnector {
    pub fn new(model: String, base_url: impl Into<String>) -> Self {
        Self {
            model,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str, params: &ModelParams) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PRIMER,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_tokens,
                seed: params.seed,
            },
        }
    }
}

#[async_trait]
impl Connector for OllamaConnector {
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<Completion, ConnectorError> {
        let request = self.build_request(prompt, params);
        let url = format!("{}/api/generate", self.base_url);

        let started = Instant::now();
        let response: GenerateResponse = send_json(
            self.client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&request),
            "ollama",
        )
        .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = response.eval_count.unwrap_or(0);

        Ok(Completion {
            text: response.response,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                latency_ms,
            },
        })
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_disables_streaming_and_maps_params() {
        let connector = OllamaConnector::new("llama3".into(), DEFAULT_OLLAMA_BASE);
        let params = ModelParams {
            temperature: 0.5,
            top_p: None,
            max_tokens: Some(128),
            seed: Some(7),
        };

        let json = serde_json::to_value(connector.build_request("Go on", &params)).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 128);
        assert_eq!(json["options"]["seed"], 7);
    }

    #[test]
    fn response_counts_fold_into_usage() {
        let body = r#"{"response": "As you command.", "prompt_eval_count": 30, "eval_count": 8, "done": true}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.response, "As you command.");
        assert_eq!(parsed.prompt_eval_count, Some(30));
        assert_eq!(parsed.eval_count, Some(8));
    }
}
