//! Common types for model interactions
//!
//! These types are shared across the provider connectors to represent
//! sampling parameters, completions, and token usage.

use serde::{Deserialize, Serialize};

/// Sampling parameters for a single generation request.
///
/// Everything here participates in the cache fingerprint, so fields must
/// serialize deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff, if the provider supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Deterministic sampling seed. Providers that cannot honor it still
    /// include it in the fingerprint so replays stay stable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: None,
            max_tokens: None,
            seed: None,
        }
    }
}

/// Token usage statistics for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,

    /// Wall-clock latency of the producing request in milliseconds.
    /// Cached replays report the latency of the original request.
    #[serde(default)]
    pub latency_ms: u64,
}

impl Usage {
    /// Fold another usage record into this one. Latency accumulates so the
    /// total reflects time spent waiting on providers.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.latency_ms += other.latency_ms;
    }
}

/// A completed generation: the text plus its usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_all_counters() {
        let mut total = Usage::default();
        total.accumulate(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            latency_ms: 120,
        });
        total.accumulate(&Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
            latency_ms: 30,
        });

        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.latency_ms, 150);
    }

    #[test]
    fn params_default_temperature_applies_on_deserialize() {
        let params: ModelParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.temperature, 0.7);
        assert!(params.top_p.is_none());
        assert!(params.seed.is_none());
    }
}
