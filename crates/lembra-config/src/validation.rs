// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, known LLM backend names, and
//! well-formed keys.

use crate::diagnostic::ConfigError;
use crate::model::LembraConfig;

/// Backends accepted for `llm.backend`.
pub const LLM_BACKENDS: &[&str] = &["gateway", "gemini", "anthropic"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LembraConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.gateway.bind_address.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.bind_address must not be empty".to_string(),
        });
    } else if config
        .gateway
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "gateway.bind_address `{}` is not a valid socket address",
                config.gateway.bind_address
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if !LLM_BACKENDS.contains(&config.llm.backend.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "llm.backend `{}` is not one of: {}",
                config.llm.backend,
                LLM_BACKENDS.join(", ")
            ),
        });
    }

    // Only enforced when the backend is actually in use (key configured).
    if config.llm.backend == "gateway"
        && config.llm.api_key.is_some()
        && config.llm.base_url.is_none()
    {
        errors.push(ConfigError::Validation {
            message: "llm.base_url is required when llm.backend = \"gateway\"".to_string(),
        });
    }

    if config.llm.max_tokens == 0 {
        errors.push(ConfigError::Validation {
            message: "llm.max_tokens must be greater than zero".to_string(),
        });
    }

    if config.agent.auto_close_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "agent.auto_close_secs must be greater than zero".to_string(),
        });
    }

    if config.agent.agent_id.contains(':') {
        errors.push(ConfigError::Validation {
            message: "agent.agent_id must not contain `:` (it is a session key segment)"
                .to_string(),
        });
    }

    if let Some(ref key) = config.discord.public_key {
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            _ => errors.push(ConfigError::Validation {
                message: "discord.public_key must be 64 hex characters (32 bytes)".to_string(),
            }),
        }
    }

    for (i, term) in config.moderation.blocked_terms.iter().enumerate() {
        if term.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("moderation.blocked_terms[{i}] must not be empty"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&LembraConfig::default()).is_ok());
    }

    #[test]
    fn gateway_backend_with_key_requires_base_url() {
        let mut config = LembraConfig::default();
        config.llm.api_key = Some("k".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("llm.base_url"))));

        config.llm.base_url = Some("https://gateway.example/v1".to_string());
        assert!(validate_config(&config).is_ok());
    }

    fn valid_config() -> LembraConfig {
        let mut config = LembraConfig::default();
        config.llm.base_url = Some("https://gateway.example/v1".to_string());
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = valid_config();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn bad_bind_address_fails() {
        let mut config = valid_config();
        config.gateway.bind_address = "not an address".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("bind_address"))));
    }

    #[test]
    fn unknown_llm_backend_fails() {
        let mut config = valid_config();
        config.llm.backend = "mistral".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("llm.backend"))));
    }

    #[test]
    fn short_discord_key_fails() {
        let mut config = valid_config();
        config.discord.public_key = Some("abcd".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("discord.public_key"))));
    }

    #[test]
    fn valid_discord_key_passes() {
        let mut config = valid_config();
        config.discord.public_key = Some("ab".repeat(32));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn colon_in_agent_id_fails() {
        let mut config = valid_config();
        config.agent.agent_id = "a:b".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("agent_id"))));
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = valid_config();
        config.storage.database_path = "".to_string();
        config.llm.backend = "mistral".to_string();
        config.agent.auto_close_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
