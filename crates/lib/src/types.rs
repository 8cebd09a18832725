use serde::{Deserialize, Serialize};
use std::fmt;

/// A reusable configuration for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    /// The full chat completions URL (e.g. `https://api.openai.com/v1/chat/completions`).
    pub api_url: String,
}

/// A recognized model identifier and how much it costs to call.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ModelConfig {
    /// The key of the provider to use from the `providers` map.
    pub provider: String,
    /// Price in USD per 1000 prompt tokens.
    #[serde(default)]
    pub prompt_cost_per_1k: f64,
    /// Price in USD per 1000 completion tokens.
    #[serde(default)]
    pub completion_cost_per_1k: f64,
}

impl ModelConfig {
    /// Estimates the cost of a call from the token usage the provider reported.
    pub fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.prompt_cost_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * self.completion_cost_per_1k
    }
}

/// Per-request credentials for the model provider.
///
/// These travel with the request down to the provider constructor; nothing is ever
/// written to the process environment.
#[derive(Clone)]
pub struct AgentCredentials {
    pub api_key: String,
}

impl AgentCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for AgentCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// The text a provider generated, together with its token usage.
#[derive(Debug, Clone, Default)]
pub struct AiResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_cost_uses_both_prices() {
        let model = ModelConfig {
            provider: "openai".to_string(),
            prompt_cost_per_1k: 0.005,
            completion_cost_per_1k: 0.015,
        };
        let usage = TokenUsage {
            prompt_tokens: 2000,
            completion_tokens: 1000,
        };
        assert!((model.estimate_cost(&usage) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = AgentCredentials::new("sk-secret");
        assert!(!format!("{creds:?}").contains("sk-secret"));
    }
}
