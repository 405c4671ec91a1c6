// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lembra assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Lembra configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LembraConfig {
    /// Assistant identity and conversation behavior settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Telegram bot integration settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// WhatsApp integration settings (Cloud API and Evolution backends).
    #[serde(default)]
    pub whatsapp: WhatsappConfig,

    /// Discord bot integration settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Enrichment lookup settings (TMDB, YouTube).
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Content moderation settings.
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Tool enablement overrides.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Assistant identity and conversation behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Default display name of the assistant (per-user renames override it).
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Stable agent identifier used in session keys.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// BCP 47 tag for user-facing message language.
    #[serde(default = "default_language")]
    pub language: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds of idle time before a conversation is auto-closed.
    #[serde(default = "default_auto_close_secs")]
    pub auto_close_secs: u64,

    /// Seconds since last update after which a conversation is considered
    /// stale and defensively reset on the next inbound message.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            agent_id: default_agent_id(),
            language: default_language(),
            log_level: default_log_level(),
            auto_close_secs: default_auto_close_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_agent_name() -> String {
    "lembra".to_string()
}

fn default_agent_id() -> String {
    "lembra".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auto_close_secs() -> u64 {
    180
}

fn default_stale_after_secs() -> u64 {
    600
}

/// Telegram bot integration configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables Telegram integration.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Bot username (without `@`) used for group mention gating.
    #[serde(default)]
    pub bot_username: Option<String>,

    /// Shared secret expected in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// WhatsApp integration configuration, covering both supported backends.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsappConfig {
    /// Meta WhatsApp Cloud API backend.
    #[serde(default)]
    pub cloud: WhatsappCloudConfig,

    /// Evolution API backend.
    #[serde(default)]
    pub evolution: WhatsappEvolutionConfig,
}

/// WhatsApp Cloud API backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsappCloudConfig {
    /// Graph API access token. `None` disables this backend.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Sending phone number id.
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// App secret for `X-Hub-Signature-256` HMAC verification.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token echoed back during webhook subscription verification.
    #[serde(default)]
    pub verify_token: Option<String>,
}

/// Evolution API backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsappEvolutionConfig {
    /// Base URL of the Evolution server. `None` disables this backend.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key sent as the `apikey` header and expected on webhooks.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Instance name on the Evolution server.
    #[serde(default)]
    pub instance: Option<String>,
}

/// Discord bot integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    /// Discord bot token. `None` disables Discord integration.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Hex-encoded ed25519 application public key for webhook signature
    /// verification. When absent, webhook verification is presence-only.
    #[serde(default)]
    pub public_key: Option<String>,

    /// Command prefix honored in guild channels.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            public_key: None,
            command_prefix: default_command_prefix(),
        }
    }
}

fn default_command_prefix() -> String {
    "!".to_string()
}

/// LLM backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Which backend to use: `gateway`, `gemini`, or `anthropic`.
    #[serde(default = "default_llm_backend")]
    pub backend: String,

    /// API key for the selected backend.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier passed to the backend.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Base URL override. Required for `gateway` (the AI Gateway endpoint),
    /// optional elsewhere.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

fn default_llm_backend() -> String {
    "gateway".to_string()
}

fn default_llm_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

/// Enrichment lookup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// TMDB API key. `None` disables movie/TV enrichment.
    #[serde(default)]
    pub tmdb_api_key: Option<String>,

    /// YouTube Data API key. `None` disables video enrichment.
    #[serde(default)]
    pub youtube_api_key: Option<String>,

    /// Preferred metadata language.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            youtube_api_key: None,
            language: default_language(),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "lembra.db".to_string()
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Socket address the gateway binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Accept webhooks without verification. Development only; every
    /// production deployment must leave this off.
    #[serde(default)]
    pub dev_allow_unverified: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            dev_allow_unverified: false,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8720".to_string()
}

/// Content moderation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModerationConfig {
    /// Master switch for offensive content handling.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Case-insensitive terms that count as offenses.
    #[serde(default)]
    pub blocked_terms: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            blocked_terms: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Tool enablement overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// User tools disabled at startup (system tools cannot be disabled).
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_identity() {
        let config = LembraConfig::default();
        assert_eq!(config.agent.name, "lembra");
        assert_eq!(config.agent.language, "pt-BR");
        assert_eq!(config.agent.auto_close_secs, 180);
        assert_eq!(config.gateway.bind_address, "127.0.0.1:8720");
        assert!(!config.gateway.dev_allow_unverified);
        assert!(config.moderation.enabled);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
[agent]
naem = "typo"
"#;
        assert!(toml::from_str::<LembraConfig>(toml).is_err());
    }

    #[test]
    fn nested_whatsapp_sections_deserialize() {
        let toml = r#"
[whatsapp.cloud]
access_token = "tok"
phone_number_id = "555"
app_secret = "s3cret"

[whatsapp.evolution]
base_url = "http://localhost:8080"
api_key = "evo-key"
instance = "main"
"#;
        let config: LembraConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.whatsapp.cloud.access_token.as_deref(), Some("tok"));
        assert_eq!(config.whatsapp.evolution.instance.as_deref(), Some("main"));
    }

    #[test]
    fn llm_defaults() {
        let config = LembraConfig::default();
        assert_eq!(config.llm.backend, "gateway");
        assert_eq!(config.llm.max_tokens, 1024);
        assert!(config.llm.api_key.is_none());
    }
}
