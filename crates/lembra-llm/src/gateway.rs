// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an OpenAI-compatible AI Gateway endpoint
//! (e.g. Cloudflare AI Gateway).
//!
//! The gateway fronts whatever upstream model the deployment routes to;
//! this client only speaks the chat-completions wire shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lembra_core::{ChatRole, ChatTurn, LembraError, LlmProvider};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// OpenAI-compatible gateway backend.
#[derive(Debug, Clone)]
pub struct GatewayLlm {
    client: reqwest::Client,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    base_url: String,
}

impl GatewayLlm {
    /// Creates a new gateway client. `base_url` is the full endpoint prefix
    /// up to (not including) `/chat/completions`.
    pub fn new(
        api_key: &str,
        base_url: String,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, LembraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| LembraError::Config(format!("invalid API key header value: {e}")))?,
        );
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
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_request(&self, prompt: &str, history: &[ChatTurn]) -> ChatRequest {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|turn| ChatMessage {
                role: match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: turn.content.clone(),
            })
            .collect();
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
        }
    }
}

#[async_trait]
impl LlmProvider for GatewayLlm {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LembraError> {
        let request = self.build_request(prompt, history);
        let url = format!("{}/chat/completions", self.base_url);

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
            debug!(status = %status, attempt, "gateway response received");

            if status.is_success() {
                let body: ChatResponse =
                    response.json().await.map_err(|e| LembraError::Provider {
                        message: format!("failed to decode response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                return body
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| LembraError::provider("gateway returned no choices"));
            }

            if matches!(status.as_u16(), 429 | 500 | 503) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(LembraError::provider(format!(
                    "API returned {status}: {body}"
                )));
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(LembraError::provider(format!(
                "API returned {status}: {body}"
            )));
        }

        Err(last_error.unwrap_or_else(|| LembraError::provider("retries exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "resposta"}}]
            })))
            .mount(&server)
            .await;

        let llm = GatewayLlm::new("test-key", server.uri(), "model-x".to_string(), 256).unwrap();
        assert_eq!(llm.complete("oi", &[]).await.unwrap(), "resposta");
    }

    #[tokio::test]
    async fn no_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let llm = GatewayLlm::new("k", server.uri(), "m".to_string(), 256).unwrap();
        assert!(llm.complete("oi", &[]).await.is_err());
    }

    #[test]
    fn trailing_slash_in_base_url_is_trimmed() {
        let llm = GatewayLlm::new("k", "http://x/v1/".to_string(), "m".to_string(), 16).unwrap();
        assert_eq!(llm.base_url, "http://x/v1");
    }
}
