//! # Dynamic AI Provider Factory
//!
//! Question requests name the model they want. This module resolves that name
//! against the recognized models and builds a provider for it with the caller's
//! own credentials, so two users asking at the same time never share a key.

use crate::{
    errors::PromptError,
    providers::ai::{openai::OpenAiProvider, AiProvider},
    types::{AgentCredentials, ModelConfig, ProviderConfig},
};
use std::collections::HashMap;
use tracing::info;

/// The instantiated provider and the configuration of the model it calls.
pub type DynamicProviderResult = (Box<dyn AiProvider>, ModelConfig);

/// Creates an AI provider for `model_name` using per-request `credentials`.
///
/// Fails with [`PromptError::UnsupportedModel`] when the model is not in the
/// recognized set, and with [`PromptError::MissingAiProvider`] when the model points
/// at a provider that is not configured.
pub fn create_dynamic_provider(
    providers_config: &HashMap<String, ProviderConfig>,
    models_config: &HashMap<String, ModelConfig>,
    model_name: &str,
    credentials: &AgentCredentials,
) -> Result<DynamicProviderResult, PromptError> {
    let model_config = models_config
        .get(model_name)
        .ok_or_else(|| PromptError::UnsupportedModel(model_name.to_string()))?;

    let provider_config = providers_config.get(&model_config.provider).ok_or_else(|| {
        PromptError::MissingAiProvider(format!(
            "Provider '{}' for model '{model_name}' is not defined in config.yml.",
            model_config.provider
        ))
    })?;

    info!(
        model = %model_name,
        provider = %model_config.provider,
        api_url = %provider_config.api_url,
        "Configuring AI provider for request."
    );

    let provider = OpenAiProvider::new(
        provider_config.api_url.clone(),
        Some(credentials.api_key.clone()),
        model_name.to_string(),
    )?;

    Ok((Box::new(provider), model_config.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (HashMap<String, ProviderConfig>, HashMap<String, ModelConfig>) {
        let providers = HashMap::from([(
            "groq".to_string(),
            ProviderConfig {
                api_url: "http://localhost:1/v1/chat/completions".to_string(),
            },
        )]);
        let models = HashMap::from([
            (
                "llama3-70b-8192".to_string(),
                ModelConfig {
                    provider: "groq".to_string(),
                    ..Default::default()
                },
            ),
            (
                "gpt-4o".to_string(),
                ModelConfig {
                    provider: "openai".to_string(),
                    ..Default::default()
                },
            ),
        ]);
        (providers, models)
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let (providers, models) = configs();
        let err = create_dynamic_provider(
            &providers,
            &models,
            "not-a-model",
            &AgentCredentials::new("k"),
        )
        .unwrap_err();
        assert!(matches!(err, PromptError::UnsupportedModel(m) if m == "not-a-model"));
    }

    #[test]
    fn test_model_with_unconfigured_provider_is_rejected() {
        let (providers, models) = configs();
        let err =
            create_dynamic_provider(&providers, &models, "gpt-4o", &AgentCredentials::new("k"))
                .unwrap_err();
        assert!(matches!(err, PromptError::MissingAiProvider(_)));
    }

    #[test]
    fn test_known_model_builds_provider() {
        let (providers, models) = configs();
        let (_provider, model) = create_dynamic_provider(
            &providers,
            &models,
            "llama3-70b-8192",
            &AgentCredentials::new("k"),
        )
        .unwrap();
        assert_eq!(model.provider, "groq");
    }
}
