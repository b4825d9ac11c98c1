//! Connector factory
//!
//! Resolves a model string to a provider from a closed set of variants and
//! builds the matching connector with environment-resolved credentials.

use crate::llm::anthropic::AnthropicConnector;
use crate::llm::ollama::{OllamaConnector, DEFAULT_OLLAMA_BASE};
use crate::llm::openai::{OpenAiConnector, DEEPSEEK_API_BASE};
use crate::llm::{Connector, ConnectorError, ConnectorFactory};
use std::env;
use std::sync::Arc;

/// Supported model provider families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI chat completion models
    OpenAi,
    /// Anthropic's Claude models
    Anthropic,
    /// DeepSeek's OpenAI-compatible models
    DeepSeek,
    /// Local models served by Ollama
    Ollama,
    /// Unknown provider
    Unknown(String),
}

/// Model information after parsing.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// The provider to use
    pub provider: Provider,
    /// The actual model name to pass to the API
    pub model_name: String,
}

/// Parse a model string which may be in either format:
/// - "claude-3-5-sonnet-latest" (provider inferred from model name)
/// - "anthropic/claude-3-5-sonnet-latest" (explicit provider)
/// - "ollama/llama3" (local model behind an Ollama daemon)
pub fn parse_model_string(model_str: &str) -> ModelInfo {
    if let Some((provider, model)) = model_str.split_once('/') {
        let provider = match provider.trim().to_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            "anthropic" | "claude" => Provider::Anthropic,
            "deepseek" => Provider::DeepSeek,
            "ollama" => Provider::Ollama,
            other => Provider::Unknown(other.to_string()),
        };
        return ModelInfo {
            provider,
            model_name: model.trim().to_string(),
        };
    }

    let provider = if is_anthropic_model(model_str) {
        Provider::Anthropic
    } else if is_openai_model(model_str) {
        Provider::OpenAi
    } else if is_deepseek_model(model_str) {
        Provider::DeepSeek
    } else {
        Provider::Unknown(String::new())
    };

    ModelInfo {
        provider,
        model_name: model_str.to_string(),
    }
}

/// Determine if a model name belongs to the Anthropic Claude family
fn is_anthropic_model(model: &str) -> bool {
    model.starts_with("claude-")
}

/// Determine if a model name belongs to the OpenAI family
fn is_openai_model(model: &str) -> bool {
    model.starts_with("gpt-") || model == "o1" || model.starts_with("o1-") || model.starts_with("o3")
}

/// Determine if a model name belongs to DeepSeek
fn is_deepseek_model(model: &str) -> bool {
    model.starts_with("deepseek-")
}

fn resolve_api_key(var: &str) -> Result<String, ConnectorError> {
    env::var(var).map_err(|_| {
        ConnectorError::Config(format!("{var} environment variable not set"))
    })
}

/// Factory that infers providers from model names and pulls credentials
/// from the environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConnectorFactory;

impl EnvConnectorFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectorFactory for EnvConnectorFactory {
    fn create(&self, model: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        let info = parse_model_string(model);

        match info.provider {
            Provider::OpenAi => {
                let api_key = resolve_api_key("OPENAI_API_KEY")?;
                Ok(Arc::new(OpenAiConnector::new(api_key, info.model_name)))
            }
            Provider::Anthropic => {
                let api_key = resolve_api_key("ANTHROPIC_API_KEY")?;
                Ok(Arc::new(AnthropicConnector::new(api_key, info.model_name)))
            }
            Provider::DeepSeek => {
                let api_key = resolve_api_key("DEEPSEEK_API_KEY")?;
                Ok(Arc::new(OpenAiConnector::with_base_url(
                    api_key,
                    info.model_name,
                    DEEPSEEK_API_BASE,
                    "deepseek",
                )))
            }
            Provider::Ollama => {
                let base_url =
                    env::var("OLLAMA_API_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE.to_string());
                Ok(Arc::new(OllamaConnector::new(info.model_name, base_url)))
            }
            Provider::Unknown(provider) => {
                let detail = if provider.is_empty() {
                    format!("unknown model '{model}', cannot determine provider")
                } else {
                    format!("unknown provider '{provider}' in '{model}'")
                };
                Err(ConnectorError::Config(format!(
                    "{detail}. Supported: Anthropic ('claude-...'), OpenAI ('gpt-...', 'o1...'), \
                     DeepSeek ('deepseek-...'), Ollama ('ollama/<model>'), or the explicit \
                     'provider/model' form"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_providers_from_model_prefixes() {
        assert_eq!(
            parse_model_string("claude-3-5-sonnet-latest").provider,
            Provider::Anthropic
        );
        assert_eq!(parse_model_string("gpt-4o").provider, Provider::OpenAi);
        assert_eq!(parse_model_string("o1-mini").provider, Provider::OpenAi);
        assert_eq!(
            parse_model_string("deepseek-chat").provider,
            Provider::DeepSeek
        );
    }

    #[test]
    fn explicit_provider_prefix_wins() {
        let info = parse_model_string("anthropic/claude-3-opus-20240229");
        assert_eq!(info.provider, Provider::Anthropic);
        assert_eq!(info.model_name, "claude-3-opus-20240229");

        let info = parse_model_string("ollama/llama3");
        assert_eq!(info.provider, Provider::Ollama);
        assert_eq!(info.model_name, "llama3");
    }

    #[test]
    fn unknown_models_are_flagged() {
        assert_eq!(
            parse_model_string("mistral-large").provider,
            Provider::Unknown(String::new())
        );
        assert_eq!(
            parse_model_string("acme/whizbang").provider,
            Provider::Unknown("acme".to_string())
        );
    }

    #[test]
    fn factory_rejects_unknown_models_with_config_error() {
        let factory = EnvConnectorFactory::new();
        let err = factory.create("totally-made-up-model").unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }
}
