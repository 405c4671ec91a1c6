// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evolution API backend (self-hosted WhatsApp Web bridge).
//!
//! The second WhatsApp backend: a different payload shape, `apikey`
//! header authentication on both directions, and `fromMe` suppression for
//! self-sent messages. Group JIDs (`@g.us`) are gated on a `/` command
//! marker since this surface has no bot-mention concept.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use lembra_config::model::WhatsappEvolutionConfig;
use lembra_core::types::{
    ChannelCapabilities, IncomingMessage, MessageMetadata, MessageType, PhotoCard, Provider,
};
use lembra_core::{LembraError, MessagingProvider, WebhookRequest};

/// Header Evolution sends its API key in.
const APIKEY_HEADER: &str = "apikey";

#[derive(Debug, Deserialize)]
struct EvolutionPayload {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    key: MessageKey,
    #[serde(rename = "pushName", default)]
    push_name: Option<String>,
    #[serde(default)]
    message: Option<MessageBody>,
    #[serde(rename = "messageTimestamp", default)]
    message_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    #[serde(rename = "remoteJid")]
    remote_jid: String,
    #[serde(rename = "fromMe", default)]
    from_me: bool,
    id: String,
    #[serde(default)]
    participant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    conversation: Option<String>,
    #[serde(rename = "extendedTextMessage", default)]
    extended_text: Option<ExtendedText>,
    #[serde(rename = "imageMessage", default)]
    image: Option<CaptionedMedia>,
    #[serde(rename = "videoMessage", default)]
    video: Option<CaptionedMedia>,
}

#[derive(Debug, Deserialize)]
struct ExtendedText {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionedMedia {
    #[serde(default)]
    caption: Option<String>,
}

/// Evolution API messaging adapter.
pub struct EvolutionChannel {
    http: reqwest::Client,
    config: WhatsappEvolutionConfig,
    allow_unverified: bool,
}

impl EvolutionChannel {
    pub fn new(
        config: WhatsappEvolutionConfig,
        allow_unverified: bool,
    ) -> Result<Self, LembraError> {
        if config.base_url.as_deref().unwrap_or_default().is_empty() {
            return Err(LembraError::Config(
                "whatsapp.evolution.base_url is required for the Evolution adapter".into(),
            ));
        }
        if config.instance.as_deref().unwrap_or_default().is_empty() {
            return Err(LembraError::Config(
                "whatsapp.evolution.instance is required for the Evolution adapter".into(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            allow_unverified,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config
                .base_url
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('/'),
            action,
            self.config.instance.as_deref().unwrap_or_default()
        )
    }

    async fn post(&self, action: &str, body: serde_json::Value) -> Result<(), LembraError> {
        let response = self
            .http
            .post(self.endpoint(action))
            .header(APIKEY_HEADER, self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| LembraError::Channel {
                message: format!("evolution request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LembraError::channel(format!(
                "evolution returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for EvolutionChannel {
    fn name(&self) -> &str {
        "whatsapp-evolution"
    }

    fn provider(&self) -> Provider {
        Provider::WhatsappEvolution
    }

    fn capabilities(&self) -> ChannelCapabilities {
        // Text-first surface: lists render as numbered text.
        ChannelCapabilities {
            supports_buttons: false,
            supports_photos: true,
            supports_typing: false,
            supports_read_receipts: false,
            supports_callbacks: false,
            max_message_length: Some(4096),
        }
    }

    /// API-key header equality. Fails closed.
    fn verify_webhook(&self, request: &WebhookRequest) -> bool {
        match self.config.api_key.as_deref() {
            Some(expected) => request.header(APIKEY_HEADER) == Some(expected),
            None => self.allow_unverified,
        }
    }

    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        let payload: EvolutionPayload = serde_json::from_value(payload.clone()).ok()?;
        if payload.event.as_deref() != Some("messages.upsert") {
            return None;
        }
        let data = payload.data?;

        if data.key.from_me {
            debug!(jid = %data.key.remote_jid, "ignoring self-sent message");
            return None;
        }

        let body = data.message?;
        let (text, message_type) = if let Some(text) = body.conversation {
            (text, MessageType::Text)
        } else if let Some(text) = body.extended_text.and_then(|t| t.text) {
            (text, MessageType::Text)
        } else if let Some(caption) = body.image.and_then(|m| m.caption) {
            (caption, MessageType::Caption)
        } else if let Some(caption) = body.video.and_then(|m| m.caption) {
            (caption, MessageType::Caption)
        } else {
            return None;
        };
        if text.trim().is_empty() {
            return None;
        }

        let is_group = data.key.remote_jid.ends_with("@g.us");
        // No mention concept on this surface: groups require a command marker.
        if is_group && !text.trim_start().starts_with('/') {
            debug!(jid = %data.key.remote_jid, "group message without command marker, gated");
            return None;
        }

        // In groups the sender is the participant; in DMs it is the JID.
        let user_id = data
            .key
            .participant
            .clone()
            .unwrap_or_else(|| data.key.remote_jid.clone());

        Some(IncomingMessage {
            message_id: data.key.id,
            external_id: data.key.remote_jid,
            user_id,
            sender_name: data.push_name,
            text,
            timestamp: data
                .message_timestamp
                .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                .unwrap_or_else(chrono::Utc::now)
                .to_rfc3339(),
            provider: Provider::WhatsappEvolution,
            callback_query_id: None,
            callback_data: None,
            linking_token: None,
            metadata: MessageMetadata {
                is_group,
                mentioned: !is_group,
                message_type,
            },
        })
    }

    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError> {
        self.post(
            "message/sendText",
            serde_json::json!({ "number": external_id, "text": text }),
        )
        .await
    }

    async fn send_photo(&self, external_id: &str, photo: &PhotoCard) -> Result<(), LembraError> {
        self.post(
            "message/sendMedia",
            serde_json::json!({
                "number": external_id,
                "mediatype": "image",
                "media": photo.url,
                "caption": photo.caption,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WhatsappEvolutionConfig {
        WhatsappEvolutionConfig {
            base_url: Some("http://evolution:8080".to_string()),
            api_key: Some("evo-key".to_string()),
            instance: Some("main".to_string()),
        }
    }

    fn channel() -> EvolutionChannel {
        EvolutionChannel::new(config(), false).unwrap()
    }

    fn upsert_payload(jid: &str, text: &str, from_me: bool) -> serde_json::Value {
        serde_json::json!({
            "event": "messages.upsert",
            "instance": "main",
            "data": {
                "key": {"remoteJid": jid, "fromMe": from_me, "id": "BAE5F1"},
                "pushName": "Fulano",
                "message": {"conversation": text},
                "messageTimestamp": 1700000000i64,
            }
        })
    }

    #[test]
    fn apikey_header_verification_fails_closed() {
        let channel = channel();
        let ok = WebhookRequest::new(
            [(APIKEY_HEADER.to_string(), "evo-key".to_string())],
            Vec::new(),
        );
        let wrong = WebhookRequest::new(
            [(APIKEY_HEADER.to_string(), "nope".to_string())],
            Vec::new(),
        );
        assert!(channel.verify_webhook(&ok));
        assert!(!channel.verify_webhook(&wrong));
        assert!(!channel.verify_webhook(&WebhookRequest::new([], Vec::new())));
    }

    #[test]
    fn dm_text_parses() {
        let msg = channel()
            .parse_incoming(&upsert_payload("5511988887777@s.whatsapp.net", "oi", false))
            .unwrap();
        assert_eq!(msg.text, "oi");
        assert_eq!(msg.external_id, "5511988887777@s.whatsapp.net");
        assert_eq!(msg.user_id, "5511988887777@s.whatsapp.net");
        assert_eq!(msg.provider, Provider::WhatsappEvolution);
        assert!(!msg.metadata.is_group);
    }

    #[test]
    fn from_me_is_suppressed() {
        assert!(channel()
            .parse_incoming(&upsert_payload("5511988887777@s.whatsapp.net", "eco", true))
            .is_none());
    }

    #[test]
    fn group_without_command_is_gated() {
        assert!(channel()
            .parse_incoming(&upsert_payload("123-456@g.us", "conversa do grupo", false))
            .is_none());
    }

    #[test]
    fn group_command_passes_with_participant_sender() {
        let mut payload = upsert_payload("123-456@g.us", "/lista", false);
        payload["data"]["key"]["participant"] =
            serde_json::json!("5511977776666@s.whatsapp.net");
        let msg = channel().parse_incoming(&payload).unwrap();
        assert!(msg.metadata.is_group);
        assert_eq!(msg.user_id, "5511977776666@s.whatsapp.net");
        assert_eq!(msg.external_id, "123-456@g.us");
    }

    #[test]
    fn other_events_are_ignored() {
        let payload = serde_json::json!({"event": "connection.update", "data": {}});
        assert!(channel().parse_incoming(&payload).is_none());
    }

    #[test]
    fn extended_text_parses() {
        let payload = serde_json::json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "5511@s.whatsapp.net", "fromMe": false, "id": "X1"},
                "message": {"extendedTextMessage": {"text": "salva https://exemplo.com"}},
            }
        });
        let msg = channel().parse_incoming(&payload).unwrap();
        assert_eq!(msg.text, "salva https://exemplo.com");
    }

    #[test]
    fn buttons_are_not_supported() {
        assert!(!channel().capabilities().supports_buttons);
    }

    #[tokio::test]
    async fn send_text_posts_to_instance_endpoint() {
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/main"))
            .and(header(APIKEY_HEADER, "evo-key"))
            .and(body_partial_json(serde_json::json!({"text": "oi"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = EvolutionChannel::new(
            WhatsappEvolutionConfig {
                base_url: Some(server.uri()),
                ..config()
            },
            false,
        )
        .unwrap();
        channel
            .send_text("5511988887777@s.whatsapp.net", "oi")
            .await
            .unwrap();
    }
}
