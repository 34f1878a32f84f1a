// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI-compatible Chat Completions Adapter
//
// Serves both the OpenAI and Perplexity variants; they differ only in the
// default endpoint and the provider name reported on completions.

use crate::domain::llm::{Completion, CompletionRequest, FinishReason, LlmError, TokenUsage};
use serde::{Deserialize, Serialize};

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const PERPLEXITY_ENDPOINT: &str = "https://api.perplexity.ai";

#[derive(Debug, Clone)]
pub struct ChatCompletionsAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    provider: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatCompletionsAdapter {
    pub fn new(
        client: reqwest::Client,
        provider: &'static str,
        endpoint: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            model,
            provider,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn submit(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status == 401 || status == 403 {
                LlmError::Authentication(error_text)
            } else if status == 429 {
                LlmError::RateLimit
            } else if status == 404 {
                LlmError::ModelNotFound(self.model.clone())
            } else {
                LlmError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(format!("Failed to parse response: {}", e)))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Provider("No response from model".into()))?;

        Ok(Completion {
            text: choice.message.content,
            usage,
            provider: self.provider,
            model: self.model.clone(),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_completion_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"length"}],
                    "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
            )
            .create_async()
            .await;

        let adapter = ChatCompletionsAdapter::new(
            reqwest::Client::new(),
            "openai",
            server.url(),
            "sk-test".into(),
            "gpt-4-turbo".into(),
        );
        let completion = adapter.submit(&CompletionRequest::new("hi")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(completion.text, "ok");
        assert_eq!(completion.usage.total(), 4);
        assert_eq!(completion.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_rate_limit_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let adapter = ChatCompletionsAdapter::new(
            reqwest::Client::new(),
            "perplexity",
            server.url(),
            "pplx".into(),
            "sonar".into(),
        );
        let err = adapter.submit(&CompletionRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimit));
    }
}
