// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Handles request construction, authentication headers, and transient
//! error retry (429, 500, 503 get one retry after a short delay).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lembra_core::{ChatRole, ChatTurn, LembraError, LlmProvider};

/// Base URL for the Anthropic API.
const API_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    type_: String,
    message: String,
}

/// Anthropic Messages API backend.
#[derive(Debug, Clone)]
pub struct AnthropicLlm {
    client: reqwest::Client,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    base_url: String,
}

impl AnthropicLlm {
    /// Creates a new Anthropic API client.
    pub fn new(api_key: &str, model: String, max_tokens: u32) -> Result<Self, LembraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| LembraError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LembraError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model,
            max_tokens,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request(&self, prompt: &str, history: &[ChatTurn]) -> MessageRequest {
        let mut messages: Vec<ApiMessage> = history
            .iter()
            .map(|turn| ApiMessage {
                role: match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: turn.content.clone(),
            })
            .collect();
        messages.push(ApiMessage {
            role: "user",
            content: prompt.to_string(),
        });
        MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicLlm {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LembraError> {
        let request = self.build_request(prompt, history);
        let url = format!("{}/v1/messages", self.base_url);

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| LembraError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "anthropic response received");

            if status.is_success() {
                let body: MessageResponse =
                    response.json().await.map_err(|e| LembraError::Provider {
                        message: format!("failed to decode response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let text = body
                    .content
                    .iter()
                    .filter(|b| b.block_type == "text")
                    .map(|b| b.text.as_str())
                    .collect::<Vec<_>>()
                    .join("");
                return Ok(text);
            }

            if is_transient_error(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(LembraError::provider(format!(
                    "API returned {status}: {body}"
                )));
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&body) {
                format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.type_, api_err.error.message
                )
            } else {
                format!("API returned {status}: {body}")
            };
            return Err(LembraError::provider(message));
        }

        Err(last_error.unwrap_or_else(|| LembraError::provider("retries exhausted")))
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> AnthropicLlm {
        AnthropicLlm::new("test-key", "claude-haiku-4-5-20250901".to_string(), 256)
            .unwrap()
            .with_base_url(base_url)
    }

    #[tokio::test]
    async fn complete_returns_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "olá!"}]
            })))
            .mount(&server)
            .await;

        let text = client(server.uri()).complete("oi", &[]).await.unwrap();
        assert_eq!(text, "olá!");
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .mount(&server)
            .await;

        let text = client(server.uri()).complete("oi", &[]).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn api_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "bad model"}
            })))
            .mount(&server)
            .await;

        let err = client(server.uri()).complete("oi", &[]).await.unwrap_err();
        assert!(err.to_string().contains("invalid_request_error"));
    }

    #[tokio::test]
    async fn history_precedes_prompt() {
        let client = client("http://unused".to_string());
        let request = client.build_request("terceira", &[ChatTurn::user("primeira"), ChatTurn::assistant("segunda")]);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");
        assert_eq!(request.messages[2].content, "terceira");
    }
}
