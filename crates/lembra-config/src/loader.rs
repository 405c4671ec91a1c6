// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lembra.toml` > `~/.config/lembra/lembra.toml` > `/etc/lembra/lembra.toml`
//! with environment variable overrides via `LEMBRA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LembraConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lembra/lembra.toml` (system-wide)
/// 3. `~/.config/lembra/lembra.toml` (user XDG config)
/// 4. `./lembra.toml` (local directory)
/// 5. `LEMBRA_*` environment variables
pub fn load_config() -> Result<LembraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LembraConfig::default()))
        .merge(Toml::file("/etc/lembra/lembra.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("lembra/lembra.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("lembra.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<LembraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LembraConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LembraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LembraConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `LEMBRA_TELEGRAM_BOT_TOKEN`
/// must map to `telegram.bot_token`, not `telegram.bot.token`. The nested
/// WhatsApp sections are mapped before the bare `whatsapp_` prefix so that
/// `LEMBRA_WHATSAPP_CLOUD_APP_SECRET` becomes `whatsapp.cloud.app_secret`.
fn env_provider() -> Env {
    Env::prefixed("LEMBRA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("telegram_", "telegram.", 1)
            .replacen("whatsapp_cloud_", "whatsapp.cloud.", 1)
            .replacen("whatsapp_evolution_", "whatsapp.evolution.", 1)
            .replacen("discord_", "discord.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("enrichment_", "enrichment.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("moderation_", "moderation.", 1)
            .replacen("tools_", "tools.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "lembra");
        assert_eq!(config.storage.database_path, "lembra.db");
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[agent]
name = "memo"
log_level = "debug"

[telegram]
bot_token = "123:ABC"
"#,
        )
        .unwrap();
        assert_eq!(config.agent.name, "memo");
        assert_eq!(config.agent.log_level, "debug");
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:ABC"));
    }

    #[test]
    fn unknown_key_is_a_figment_error() {
        let result = load_config_from_str(
            r#"
[agent]
does_not_exist = 1
"#,
        );
        assert!(result.is_err());
    }
}
