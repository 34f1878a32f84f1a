// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama Adapter
//
// Local models through Ollama's /api/generate endpoint. No API key.

use crate::domain::llm::{Completion, CompletionRequest, FinishReason, LlmError, TokenUsage};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
    eval_count: Option<u32>,
    prompt_eval_count: Option<u32>,
}

impl OllamaAdapter {
    pub fn new(client: reqwest::Client, endpoint: String, model: String) -> Self {
        Self {
            client,
            endpoint,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn submit(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status == 404 {
                LlmError::ModelNotFound(self.model.clone())
            } else {
                LlmError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(Completion {
            text: parsed.response,
            usage: TokenUsage {
                prompt_tokens: parsed.prompt_eval_count.unwrap_or(0),
                completion_tokens: parsed.eval_count.unwrap_or(0),
            },
            provider: "ollama",
            model: self.model.clone(),
            finish_reason: if parsed.done {
                FinishReason::Stop
            } else {
                FinishReason::Length
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_maps_token_counts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":"[]","done":true,"eval_count":7,"prompt_eval_count":11}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(reqwest::Client::new(), server.url(), "tinyllama".into());
        let completion = adapter.submit(&CompletionRequest::new("plan")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(completion.text, "[]");
        assert_eq!(completion.usage.total(), 18);
        assert_eq!(completion.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_missing_model_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(404)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(reqwest::Client::new(), server.url(), "absent".into());
        let err = adapter.submit(&CompletionRequest::new("plan")).await.unwrap_err();
        assert!(matches!(err, LlmError::ModelNotFound(model) if model == "absent"));
    }
}
