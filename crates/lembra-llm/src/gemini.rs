// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Gemini generateContent API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lembra_core::{ChatRole, ChatTurn, LembraError, LlmProvider};

/// Base URL for the Gemini API.
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini generateContent backend.
#[derive(Debug, Clone)]
pub struct GeminiLlm {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_retries: u32,
    base_url: String,
}

impl GeminiLlm {
    /// Creates a new Gemini API client.
    pub fn new(api_key: String, model: String) -> Result<Self, LembraError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LembraError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request(&self, prompt: &str, history: &[ChatTurn]) -> GenerateRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                },
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user",
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });
        GenerateRequest { contents }
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LembraError> {
        let request = self.build_request(prompt, history);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

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
            debug!(status = %status, attempt, "gemini response received");

            if status.is_success() {
                let body: GenerateResponse =
                    response.json().await.map_err(|e| LembraError::Provider {
                        message: format!("failed to decode response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let text = body
                    .candidates
                    .first()
                    .map(|c| {
                        c.content
                            .parts
                            .iter()
                            .map(|p| p.text.as_str())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                if text.is_empty() {
                    return Err(LembraError::provider("gemini returned no candidates"));
                }
                return Ok(text);
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
