//! Model connector abstraction layer
//!
//! This module defines the trait and types for dispatching generation
//! requests to different model providers (OpenAI-compatible, Anthropic,
//! Ollama) behind one capability interface.

pub use async_trait::async_trait;

pub mod anthropic;
pub mod factory;
mod http;
pub mod ollama;
pub mod openai;
pub mod retry;
mod types;

pub use self::factory::{EnvConnectorFactory, Provider};
pub use self::retry::{generate_with_retry, GenerateOutcome, RetryConfig};
pub use self::types::*;

use std::sync::Arc;

/// Common trait for all model connectors.
///
/// A connector turns one prompt into one completion. Conversation state,
/// retries, and caching all live above this boundary.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Generate a completion for the given prompt.
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<Completion, ConnectorError>;

    /// Provider family name, e.g. "openai" or "anthropic".
    fn provider(&self) -> &str;

    /// Model identifier passed to the provider API.
    fn model(&self) -> &str;
}

/// Creation seam for connectors.
///
/// Production code uses [`EnvConnectorFactory`]; tests substitute scripted
/// connectors without touching the scheduler.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, model: &str) -> Result<Arc<dyn Connector>, ConnectorError>;
}

/// Error taxonomy for connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Network error, timeout, rate limit, or server error. Retryable.
    #[error("transient failure from {provider}: {message}")]
    Transient {
        provider: String,
        message: String,
        /// Server-requested retry delay in seconds, if any.
        retry_after: Option<u64>,
    },

    /// Credentials missing or rejected. Fatal, never retried.
    #[error("authentication rejected by {provider}: {message}")]
    Auth { provider: String, message: String },

    /// Malformed or empty output. Retryable up to the attempt bound.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// The provider cannot serve this request at all. Fatal for the
    /// provider; the conversation may continue without the character.
    #[error("provider {provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    /// Unknown model or misconfigured connector.
    #[error("connector configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Whether the retry loop should attempt this request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Transient { .. } | ConnectorError::InvalidResponse { .. }
        )
    }

    /// Whether the failure excuses the character for the rest of the run.
    pub fn excuses_character(&self) -> bool {
        matches!(
            self,
            ConnectorError::Auth { .. }
                | ConnectorError::Unavailable { .. }
                | ConnectorError::Config(_)
        )
    }

    /// Server-requested retry delay in milliseconds, if the provider sent one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ConnectorError::Transient {
                retry_after: Some(secs),
                ..
            } => Some(secs * 1000),
            _ => None,
        }
    }
}
