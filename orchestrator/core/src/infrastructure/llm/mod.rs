// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure
//
// `LlmProvider` is the closed set of supported backends. It is resolved once
// from `LlmConfig` at startup and handed to whoever needs it; adding a
// backend means adding a variant.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::config::{resolve_secret, ConfigError, LlmConfig, LlmProviderKind};
use crate::domain::llm::{Completion, CompletionRequest, LanguageModel, LlmError};

pub use ollama::OllamaAdapter;
pub use openai::ChatCompletionsAdapter;

#[derive(Debug, Clone)]
pub enum LlmProvider {
    Ollama(OllamaAdapter),
    OpenAi(ChatCompletionsAdapter),
    Perplexity(ChatCompletionsAdapter),
}

impl LlmProvider {
    /// Map configuration to a provider. `provider: none` yields `Ok(None)`.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, ConfigError> {
        if config.provider == LlmProviderKind::None {
            return Ok(None);
        }

        let model = config
            .model
            .clone()
            .ok_or_else(|| ConfigError::Invalid("llm.model is required".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        let api_key = || {
            config
                .api_key
                .as_deref()
                .and_then(resolve_secret)
                .ok_or_else(|| ConfigError::Invalid("llm.api_key is required".into()))
        };
        let endpoint = |default: &str| config.endpoint.clone().unwrap_or_else(|| default.to_string());

        let provider = match config.provider {
            LlmProviderKind::None => return Ok(None),
            LlmProviderKind::Ollama => Self::Ollama(OllamaAdapter::new(
                client,
                endpoint(ollama::DEFAULT_ENDPOINT),
                model,
            )),
            LlmProviderKind::OpenAi => Self::OpenAi(ChatCompletionsAdapter::new(
                client,
                "openai",
                endpoint(openai::OPENAI_ENDPOINT),
                api_key()?,
                model,
            )),
            LlmProviderKind::Perplexity => Self::Perplexity(ChatCompletionsAdapter::new(
                client,
                "perplexity",
                endpoint(openai::PERPLEXITY_ENDPOINT),
                api_key()?,
                model,
            )),
        };

        info!(provider = provider.name(), model = provider.model(), "LLM provider configured");
        Ok(Some(provider))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ollama(_) => "ollama",
            Self::OpenAi(adapter) | Self::Perplexity(adapter) => adapter.provider(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Ollama(adapter) => adapter.model(),
            Self::OpenAi(adapter) | Self::Perplexity(adapter) => adapter.model(),
        }
    }
}

#[async_trait]
impl LanguageModel for LlmProvider {
    async fn submit(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let result = match self {
            Self::Ollama(adapter) => adapter.submit(request).await,
            Self::OpenAi(adapter) | Self::Perplexity(adapter) => adapter.submit(request).await,
        };
        if let Err(e) = &result {
            metrics::counter!("crewlink_llm_errors_total", "provider" => self.name()).increment(1);
            debug!(provider = self.name(), error = %e, "LLM request failed");
        }
        result
    }

    fn report_result(&self, completion: &Completion, accepted: bool) {
        metrics::counter!("crewlink_llm_tokens_total", "provider" => completion.provider)
            .increment(u64::from(completion.usage.total()));
        metrics::counter!("crewlink_llm_completions_total",
            "provider" => completion.provider,
            "accepted" => if accepted { "true" } else { "false" })
        .increment(1);
        debug!(
            provider = completion.provider,
            model = %completion.model,
            tokens = completion.usage.total(),
            accepted,
            "LLM completion consumed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_provider_is_not_built() {
        assert!(LlmProvider::from_config(&LlmConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_hosted_provider_requires_key() {
        let config = LlmConfig {
            provider: LlmProviderKind::Perplexity,
            model: Some("sonar".into()),
            ..Default::default()
        };
        assert!(LlmProvider::from_config(&config).is_err());

        let config = LlmConfig {
            api_key: Some("pplx-key".into()),
            ..config
        };
        let provider = LlmProvider::from_config(&config).unwrap().unwrap();
        assert_eq!(provider.name(), "perplexity");
        assert_eq!(provider.model(), "sonar");
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: LlmProviderKind::Ollama,
            model: Some("tinyllama".into()),
            ..Default::default()
        };
        let provider = LlmProvider::from_config(&config).unwrap().unwrap();
        assert!(matches!(provider, LlmProvider::Ollama(_)));
    }
}
