// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord channel adapter for the Lembra assistant.
//!
//! Inbound messages arrive from the serenity gateway task ([`gateway`])
//! as wire-shaped JSON and are normalized here; button taps arrive as
//! component interactions. Interaction webhooks are verified with the
//! application's ed25519 public key when configured.

pub mod gateway;

use std::sync::OnceLock;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use serenity::all::{
    ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateMessage, Http,
};
use tracing::debug;

use lembra_config::model::DiscordConfig;
use lembra_core::types::{
    Button, ChannelCapabilities, IncomingMessage, MessageMetadata, MessageType, PhotoCard,
    Provider,
};
use lembra_core::{LembraError, MessagingProvider, WebhookRequest};

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Interaction callback type 6: deferred update (ack, no new message).
const DEFERRED_UPDATE_MESSAGE: u8 = 6;

// --- Inbound wire shapes (subset) ---

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: WireUser,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    mentions: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct WireInteraction {
    id: String,
    /// 3 = message component.
    #[serde(rename = "type")]
    interaction_type: u8,
    token: String,
    #[serde(default)]
    data: Option<WireInteractionData>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    member: Option<WireMember>,
    #[serde(default)]
    user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireInteractionData {
    #[serde(default)]
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    user: WireUser,
}

/// Discord messaging adapter.
pub struct DiscordChannel {
    http: Http,
    rest: reqwest::Client,
    config: DiscordConfig,
    verifying_key: Option<VerifyingKey>,
    /// Learned from the gateway ready event; used for mention gating.
    bot_user_id: OnceLock<String>,
    allow_unverified: bool,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, allow_unverified: bool) -> Result<Self, LembraError> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                LembraError::Config("discord.bot_token is required for the Discord adapter".into())
            })?;

        let verifying_key = match config.public_key.as_deref() {
            Some(key_hex) => {
                let bytes = hex::decode(key_hex)
                    .map_err(|e| LembraError::Config(format!("discord.public_key: {e}")))?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    LembraError::Config("discord.public_key must be 32 bytes".into())
                })?;
                Some(VerifyingKey::from_bytes(&bytes).map_err(|e| {
                    LembraError::Config(format!("discord.public_key invalid: {e}"))
                })?)
            }
            None => None,
        };

        Ok(Self {
            http: Http::new(&token),
            rest: reqwest::Client::new(),
            config,
            verifying_key,
            bot_user_id: OnceLock::new(),
            allow_unverified,
        })
    }

    /// Record the bot's own user id (gateway ready event).
    pub fn set_bot_user_id(&self, id: String) {
        let _ = self.bot_user_id.set(id);
    }

    fn channel_id(external_id: &str) -> Result<ChannelId, LembraError> {
        external_id
            .parse::<u64>()
            .map(ChannelId::new)
            .map_err(|_| LembraError::channel(format!("invalid discord channel id `{external_id}`")))
    }

    fn map_send_err(e: serenity::Error) -> LembraError {
        LembraError::Channel {
            message: format!("discord send failed: {e}"),
            source: Some(Box::new(e)),
        }
    }

    fn parse_component_interaction(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        let interaction: WireInteraction = serde_json::from_value(payload.clone()).ok()?;
        if interaction.interaction_type != 3 {
            return None;
        }
        let custom_id = interaction.data?.custom_id?;
        let user = interaction
            .member
            .map(|m| m.user)
            .or(interaction.user)?;
        let channel_id = interaction.channel_id?;

        Some(IncomingMessage {
            message_id: format!("int-{}", interaction.id),
            external_id: channel_id,
            user_id: user.id,
            sender_name: Some(user.username),
            text: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            provider: Provider::Discord,
            // id and token travel together so the ack can reach the API.
            callback_query_id: Some(format!("{}:{}", interaction.id, interaction.token)),
            callback_data: Some(custom_id),
            linking_token: None,
            metadata: MessageMetadata {
                is_group: interaction.guild_id.is_some(),
                mentioned: true,
                message_type: MessageType::Callback,
            },
        })
    }
}

#[async_trait]
impl MessagingProvider for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn provider(&self) -> Provider {
        Provider::Discord
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_buttons: true,
            supports_photos: true,
            supports_typing: true,
            supports_read_receipts: false,
            supports_callbacks: true,
            max_message_length: Some(2000),
        }
    }

    /// Ed25519 verification over `timestamp + body` when a public key is
    /// configured; header presence check otherwise. Fails closed.
    fn verify_webhook(&self, request: &WebhookRequest) -> bool {
        let signature = request.header(SIGNATURE_HEADER);
        let timestamp = request.header(TIMESTAMP_HEADER);

        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return self.allow_unverified;
        };

        match self.verifying_key {
            Some(ref key) => {
                let Ok(sig_bytes) = hex::decode(signature) else {
                    return false;
                };
                let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
                    return false;
                };
                let signature = Signature::from_bytes(&sig_array);
                let mut signed = timestamp.as_bytes().to_vec();
                signed.extend_from_slice(&request.body);
                key.verify(&signed, &signature).is_ok()
            }
            // No key configured: signature-header presence is the contract;
            // full verification is an upstream concern.
            None => true,
        }
    }

    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        // Component interactions first (they carry `type` + `token`).
        if payload.get("token").is_some() {
            return self.parse_component_interaction(payload);
        }

        let message: WireMessage = serde_json::from_value(payload.clone()).ok()?;
        if message.author.bot {
            debug!(message_id = %message.id, "ignoring bot message");
            return None;
        }
        if message.content.trim().is_empty() {
            return None;
        }

        let is_guild = message.guild_id.is_some();
        let bot_id = self.bot_user_id.get();
        let mentioned = bot_id
            .map(|id| {
                message.mentions.iter().any(|u| &u.id == id)
                    || message.content.contains(&format!("<@{id}>"))
            })
            .unwrap_or(false);

        // Mention gating for guild channels.
        let prefix = &self.config.command_prefix;
        if is_guild && !mentioned && !message.content.trim_start().starts_with(prefix.as_str()) {
            debug!(message_id = %message.id, "guild message without mention, gated");
            return None;
        }

        // Strip the mention and the command prefix.
        let mut text = message.content.clone();
        if let Some(id) = bot_id {
            text = text
                .replace(&format!("<@{id}>"), " ")
                .replace(&format!("<@!{id}>"), " ");
        }
        let text = text.trim();
        let text = text.strip_prefix(prefix.as_str()).unwrap_or(text);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }

        Some(IncomingMessage {
            message_id: message.id,
            external_id: message.channel_id,
            user_id: message.author.id,
            sender_name: Some(message.author.username),
            text,
            timestamp: message
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            provider: Provider::Discord,
            callback_query_id: None,
            callback_data: None,
            linking_token: None,
            metadata: MessageMetadata {
                is_group: is_guild,
                mentioned: mentioned || !is_guild,
                message_type: MessageType::Text,
            },
        })
    }

    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError> {
        let channel_id = Self::channel_id(external_id)?;
        channel_id
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    async fn send_buttons(
        &self,
        external_id: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), LembraError> {
        let channel_id = Self::channel_id(external_id)?;
        let rows: Vec<CreateActionRow> = buttons
            .iter()
            .map(|row| {
                CreateActionRow::Buttons(
                    row.iter()
                        .map(|b| CreateButton::new(b.callback_data.clone()).label(b.label.clone()))
                        .collect(),
                )
            })
            .collect();
        channel_id
            .send_message(
                &self.http,
                CreateMessage::new().content(text).components(rows),
            )
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    async fn send_photo(&self, external_id: &str, photo: &PhotoCard) -> Result<(), LembraError> {
        let channel_id = Self::channel_id(external_id)?;
        let embed = CreateEmbed::new()
            .description(photo.caption.clone())
            .image(photo.url.clone());
        channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    async fn send_typing(&self, external_id: &str) -> Result<(), LembraError> {
        let channel_id = Self::channel_id(external_id)?;
        channel_id
            .broadcast_typing(&self.http)
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    // Discord has no read-receipt primitive; the trait default no-op for
    // `mark_read` is the documented behavior.

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), LembraError> {
        // callback_query_id is "{interaction_id}:{token}".
        let Some((id, token)) = callback_query_id.split_once(':') else {
            return Ok(());
        };
        let url = format!("https://discord.com/api/v10/interactions/{id}/{token}/callback");
        self.rest
            .post(&url)
            .json(&serde_json::json!({ "type": DEFERRED_UPDATE_MESSAGE }))
            .send()
            .await
            .map_err(|e| LembraError::Channel {
                message: format!("interaction callback failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn config(public_key: Option<String>) -> DiscordConfig {
        DiscordConfig {
            bot_token: Some("token".to_string()),
            public_key,
            command_prefix: "!".to_string(),
        }
    }

    fn dm_payload(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "111",
            "channel_id": "222",
            "author": {"id": "444", "username": "fulano", "bot": false},
            "content": text,
            "timestamp": "2026-01-01T00:00:00Z",
            "mentions": [],
        })
    }

    fn guild_payload(text: &str) -> serde_json::Value {
        let mut payload = dm_payload(text);
        payload["guild_id"] = serde_json::json!("333");
        payload
    }

    #[test]
    fn dm_parses_without_mention() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        let msg = channel.parse_incoming(&dm_payload("salva interestelar")).unwrap();
        assert_eq!(msg.text, "salva interestelar");
        assert_eq!(msg.external_id, "222");
        assert_eq!(msg.user_id, "444");
        assert!(!msg.metadata.is_group);
    }

    #[test]
    fn guild_message_without_mention_is_gated() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        assert!(channel.parse_incoming(&guild_payload("conversa qualquer")).is_none());
    }

    #[test]
    fn guild_prefix_command_passes() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        let msg = channel.parse_incoming(&guild_payload("!lista meus filmes")).unwrap();
        assert_eq!(msg.text, "lista meus filmes");
        assert!(msg.metadata.is_group);
    }

    #[test]
    fn guild_mention_passes_and_strips() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        channel.set_bot_user_id("999".to_string());
        let mut payload = guild_payload("<@999> salva interestelar");
        payload["mentions"] = serde_json::json!([{"id": "999", "username": "lembra", "bot": true}]);
        let msg = channel.parse_incoming(&payload).unwrap();
        assert_eq!(msg.text, "salva interestelar");
        assert!(msg.metadata.mentioned);
    }

    #[test]
    fn bot_author_is_suppressed() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        let mut payload = dm_payload("eco");
        payload["author"]["bot"] = serde_json::json!(true);
        assert!(channel.parse_incoming(&payload).is_none());
    }

    #[test]
    fn component_interaction_parses_as_callback() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        let payload = serde_json::json!({
            "id": "777",
            "type": 3,
            "token": "tok-xyz",
            "channel_id": "222",
            "guild_id": "333",
            "member": {"user": {"id": "444", "username": "fulano"}},
            "data": {"custom_id": "select_2"},
        });
        let msg = channel.parse_incoming(&payload).unwrap();
        assert_eq!(msg.callback_data.as_deref(), Some("select_2"));
        assert_eq!(msg.callback_query_id.as_deref(), Some("777:tok-xyz"));
        assert_eq!(msg.metadata.message_type, MessageType::Callback);
    }

    #[test]
    fn signature_verification_with_known_key() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let public_hex = hex::encode(signing_key.verifying_key().to_bytes());
        let channel = DiscordChannel::new(config(Some(public_hex)), false).unwrap();

        let body = br#"{"type":1}"#.to_vec();
        let timestamp = "1700000000";
        let mut signed = timestamp.as_bytes().to_vec();
        signed.extend_from_slice(&body);
        let signature = hex::encode(signing_key.sign(&signed).to_bytes());

        let ok = WebhookRequest::new(
            [
                (SIGNATURE_HEADER.to_string(), signature),
                (TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            ],
            body.clone(),
        );
        assert!(channel.verify_webhook(&ok));

        let tampered = WebhookRequest::new(
            [
                (SIGNATURE_HEADER.to_string(), hex::encode([0u8; 64])),
                (TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            ],
            body,
        );
        assert!(!channel.verify_webhook(&tampered));
    }

    #[test]
    fn missing_signature_headers_fail_closed() {
        let channel = DiscordChannel::new(config(None), false).unwrap();
        assert!(!channel.verify_webhook(&WebhookRequest::new([], b"{}".to_vec())));

        // Presence-only check when no key is configured.
        let present = WebhookRequest::new(
            [
                (SIGNATURE_HEADER.to_string(), "aa".to_string()),
                (TIMESTAMP_HEADER.to_string(), "1".to_string()),
            ],
            b"{}".to_vec(),
        );
        assert!(channel.verify_webhook(&present));
    }
}
