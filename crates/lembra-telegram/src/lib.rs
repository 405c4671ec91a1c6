// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Lembra assistant.
//!
//! Inbound updates arrive over webhook (authenticated by the shared
//! secret-token header) and are normalized by [`parse`]; outbound
//! primitives go through the teloxide Bot API client.

pub mod parse;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile};
use tracing::debug;

use lembra_config::model::TelegramConfig;
use lembra_core::types::{
    Button, ChannelCapabilities, HealthStatus, IncomingMessage, PhotoCard, Provider,
};
use lembra_core::{LembraError, MessagingProvider, WebhookRequest};

/// Header Telegram sends the configured webhook secret in.
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram messaging adapter.
pub struct TelegramChannel {
    bot: Bot,
    http: reqwest::Client,
    token: String,
    config: TelegramConfig,
    /// Explicit non-production bypass for webhook verification.
    allow_unverified: bool,
}

impl TelegramChannel {
    /// Creates a new Telegram channel adapter.
    ///
    /// Requires `config.bot_token` to be set.
    pub fn new(config: TelegramConfig, allow_unverified: bool) -> Result<Self, LembraError> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                LembraError::Config("telegram.bot_token is required for Telegram adapter".into())
            })?;

        Ok(Self {
            bot: Bot::new(&token),
            http: reqwest::Client::new(),
            token,
            config,
            allow_unverified,
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    fn chat_id(external_id: &str) -> Result<ChatId, LembraError> {
        external_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| LembraError::channel(format!("invalid telegram chat id `{external_id}`")))
    }

    fn map_send_err(e: teloxide::RequestError) -> LembraError {
        LembraError::Channel {
            message: format!("telegram send failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

#[async_trait]
impl MessagingProvider for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn provider(&self) -> Provider {
        Provider::Telegram
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_buttons: true,
            supports_photos: true,
            supports_typing: true,
            supports_read_receipts: false,
            supports_callbacks: true,
            max_message_length: Some(4096),
        }
    }

    /// Shared-secret header match. Fails closed when a secret is
    /// configured or when none is and the bypass is off.
    fn verify_webhook(&self, request: &WebhookRequest) -> bool {
        match self.config.webhook_secret.as_deref() {
            Some(secret) => request.header(SECRET_TOKEN_HEADER) == Some(secret),
            None => self.allow_unverified,
        }
    }

    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        parse::parse_update(payload, self.config.bot_username.as_deref())
    }

    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError> {
        let chat_id = Self::chat_id(external_id)?;
        self.bot
            .send_message(chat_id, text)
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
        let chat_id = Self::chat_id(external_id)?;
        let markup = InlineKeyboardMarkup::new(buttons.iter().map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                .collect::<Vec<_>>()
        }));
        self.bot
            .send_message(chat_id, text)
            .reply_markup(markup)
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    async fn send_photo(&self, external_id: &str, photo: &PhotoCard) -> Result<(), LembraError> {
        let chat_id = Self::chat_id(external_id)?;
        let url = url::Url::parse(&photo.url)
            .map_err(|e| LembraError::channel(format!("invalid photo url: {e}")))?;
        self.bot
            .send_photo(chat_id, InputFile::url(url))
            .caption(photo.caption.clone())
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    async fn send_typing(&self, external_id: &str) -> Result<(), LembraError> {
        let chat_id = Self::chat_id(external_id)?;
        self.bot
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
            .map_err(Self::map_send_err)?;
        Ok(())
    }

    // Telegram bots have no read-receipt primitive; the trait default
    // no-op for `mark_read` is the documented behavior.

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), LembraError> {
        // Plain Bot API call: an empty answer just stops the client spinner.
        let url = format!(
            "https://api.telegram.org/bot{}/answerCallbackQuery",
            self.token
        );
        self.http
            .post(&url)
            .json(&serde_json::json!({ "callback_query_id": callback_query_id }))
            .send()
            .await
            .map_err(|e| LembraError::Channel {
                message: format!("answerCallbackQuery failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, LembraError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), LembraError> {
        debug!("telegram channel shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(secret: Option<&str>, allow_unverified: bool) -> TelegramChannel {
        TelegramChannel::new(
            TelegramConfig {
                bot_token: Some("123:ABC".to_string()),
                bot_username: Some("lembra_bot".to_string()),
                webhook_secret: secret.map(str::to_string),
            },
            allow_unverified,
        )
        .unwrap()
    }

    fn request(secret: Option<&str>) -> WebhookRequest {
        let headers = secret
            .map(|s| vec![(SECRET_TOKEN_HEADER.to_string(), s.to_string())])
            .unwrap_or_default();
        WebhookRequest::new(headers, b"{}".to_vec())
    }

    #[test]
    fn missing_token_is_a_config_error() {
        assert!(TelegramChannel::new(TelegramConfig::default(), false).is_err());
    }

    #[test]
    fn webhook_verification_fails_closed() {
        let channel = channel(Some("s3cret"), false);
        assert!(channel.verify_webhook(&request(Some("s3cret"))));
        assert!(!channel.verify_webhook(&request(Some("wrong"))));
        assert!(!channel.verify_webhook(&request(None)));
    }

    #[test]
    fn no_secret_rejects_unless_dev_bypass() {
        let strict = channel(None, false);
        assert!(!strict.verify_webhook(&request(None)));

        let dev = channel(None, true);
        assert!(dev.verify_webhook(&request(None)));
    }

    #[test]
    fn capabilities_match_the_platform() {
        let channel = channel(None, false);
        let caps = channel.capabilities();
        assert!(caps.supports_buttons);
        assert!(caps.supports_photos);
        assert!(caps.supports_callbacks);
        assert!(!caps.supports_read_receipts);
        assert_eq!(caps.max_message_length, Some(4096));
    }

    #[test]
    fn invalid_chat_id_is_a_channel_error() {
        assert!(TelegramChannel::chat_id("not-a-number").is_err());
        assert_eq!(TelegramChannel::chat_id("-100123").unwrap(), ChatId(-100123));
    }

    #[test]
    fn parse_goes_through_update_parser() {
        let channel = channel(None, false);
        let payload = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 42,
                "date": 1700000000i64,
                "chat": {"id": 12345i64, "type": "private"},
                "from": {"id": 12345i64, "is_bot": false, "first_name": "Teste"},
                "text": "oi",
            }
        });
        let msg = channel.parse_incoming(&payload).unwrap();
        assert_eq!(msg.provider, Provider::Telegram);
        assert_eq!(msg.text, "oi");
    }
}
