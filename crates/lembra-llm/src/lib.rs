// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider backends for the Lembra assistant.
//!
//! All backends implement [`LlmProvider`] with whole-text completions; the
//! orchestrator uses the model as a classifier and planner, never as a
//! streaming surface.

pub mod anthropic;
pub mod gateway;
pub mod gemini;

use std::sync::Arc;

use lembra_config::model::LlmConfig;
use lembra_core::{LembraError, LlmProvider};

pub use anthropic::AnthropicLlm;
pub use gateway::GatewayLlm;
pub use gemini::GeminiLlm;

/// Build the configured LLM backend.
///
/// Returns `None` when no API key is configured — the assistant then runs
/// on the deterministic classifier tiers alone.
pub fn build_provider(config: &LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>, LembraError> {
    let Some(ref api_key) = config.api_key else {
        return Ok(None);
    };

    let provider: Arc<dyn LlmProvider> = match config.backend.as_str() {
        "anthropic" => Arc::new(AnthropicLlm::new(
            api_key,
            config.model.clone(),
            config.max_tokens,
        )?),
        "gemini" => Arc::new(GeminiLlm::new(api_key.clone(), config.model.clone())?),
        "gateway" => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                LembraError::Config("llm.base_url is required for the gateway backend".to_string())
            })?;
            Arc::new(GatewayLlm::new(
                api_key,
                base_url,
                config.model.clone(),
                config.max_tokens,
            )?)
        }
        other => {
            return Err(LembraError::Config(format!(
                "unknown llm backend `{other}`"
            )))
        }
    };

    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_api_key_builds_nothing() {
        let config = LlmConfig::default();
        assert!(build_provider(&config).unwrap().is_none());
    }

    #[test]
    fn gateway_requires_base_url() {
        let config = LlmConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(build_provider(&config).is_err());
    }

    #[test]
    fn each_backend_builds() {
        for backend in ["anthropic", "gemini", "gateway"] {
            let config = LlmConfig {
                backend: backend.to_string(),
                api_key: Some("k".to_string()),
                base_url: Some("http://localhost:1".to_string()),
                ..Default::default()
            };
            let provider = build_provider(&config).unwrap().unwrap();
            assert_eq!(provider.name(), backend);
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = LlmConfig {
            backend: "mistral".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(build_provider(&config).is_err());
    }
}
