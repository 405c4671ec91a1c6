// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API backend.
//!
//! Webhooks are authenticated with an HMAC-SHA256 signature over the raw
//! body (`X-Hub-Signature-256`), hex-compared case-insensitively. Outbound
//! messages go through the Graph API; interactive reply buttons carry the
//! callback data as button ids (three buttons max on this platform, more
//! degrade to the numbered text the orchestrator already writes).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use lembra_config::model::WhatsappCloudConfig;
use lembra_core::types::{
    Button, ChannelCapabilities, IncomingMessage, MessageMetadata, MessageType, PhotoCard,
    Provider,
};
use lembra_core::{LembraError, MessagingProvider, WebhookRequest};

/// Signature header sent by Meta.
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Graph API version prefix.
const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// Reply buttons supported per interactive message.
const MAX_REPLY_BUTTONS: usize = 3;

type HmacSha256 = Hmac<Sha256>;

// --- Inbound payload shape (subset) ---

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<CloudMessage>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    profile: Option<Profile>,
    wa_id: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CloudMessage {
    from: String,
    id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    text: Option<TextBody>,
    #[serde(default)]
    image: Option<MediaBody>,
    #[serde(default)]
    video: Option<MediaBody>,
    #[serde(default)]
    document: Option<MediaBody>,
    #[serde(default)]
    interactive: Option<Interactive>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct MediaBody {
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    #[serde(default)]
    button_reply: Option<ButtonReply>,
}

#[derive(Debug, Deserialize)]
struct ButtonReply {
    id: String,
}

/// WhatsApp Cloud API messaging adapter.
pub struct WhatsappCloudChannel {
    http: reqwest::Client,
    config: WhatsappCloudConfig,
    base_url: String,
    allow_unverified: bool,
}

impl WhatsappCloudChannel {
    pub fn new(config: WhatsappCloudConfig, allow_unverified: bool) -> Result<Self, LembraError> {
        if config.access_token.as_deref().unwrap_or_default().is_empty() {
            return Err(LembraError::Config(
                "whatsapp.cloud.access_token is required for the Cloud API adapter".into(),
            ));
        }
        if config.phone_number_id.as_deref().unwrap_or_default().is_empty() {
            return Err(LembraError::Config(
                "whatsapp.cloud.phone_number_id is required for the Cloud API adapter".into(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            base_url: GRAPH_BASE_URL.to_string(),
            allow_unverified,
        })
    }

    /// Overrides the Graph base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Answer the GET subscription handshake: echo the challenge when the
    /// verify token matches.
    pub fn verify_subscription(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        if mode == "subscribe" && Some(token) == self.config.verify_token.as_deref() {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    async fn post_message(&self, body: serde_json::Value) -> Result<(), LembraError> {
        let phone_number_id = self
            .config
            .phone_number_id
            .as_deref()
            .unwrap_or_default();
        let url = format!("{}/{}/messages", self.base_url, phone_number_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.access_token.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| LembraError::Channel {
                message: format!("cloud api request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LembraError::channel(format!(
                "cloud api returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for WhatsappCloudChannel {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    fn provider(&self) -> Provider {
        Provider::WhatsappCloud
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_buttons: true,
            supports_photos: true,
            supports_typing: false,
            supports_read_receipts: true,
            supports_callbacks: true,
            max_message_length: Some(4096),
        }
    }

    /// HMAC-SHA256 over the raw body with the app secret, hex compared
    /// case-insensitively. Fails closed.
    fn verify_webhook(&self, request: &WebhookRequest) -> bool {
        let Some(secret) = self.config.app_secret.as_deref() else {
            return self.allow_unverified;
        };
        let Some(header) = request.header(SIGNATURE_HEADER) else {
            return false;
        };
        let Some(received) = header.strip_prefix("sha256=") else {
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(&request.body);
        let expected = hex::encode(mac.finalize().into_bytes());
        expected.eq_ignore_ascii_case(received)
    }

    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        let payload: WebhookPayload = serde_json::from_value(payload.clone()).ok()?;
        let value = payload
            .entry
            .into_iter()
            .flat_map(|e| e.changes)
            .map(|c| c.value)
            .next()?;
        let message = value.messages.into_iter().next()?;

        let sender_name = value
            .contacts
            .iter()
            .find(|c| c.wa_id == message.from)
            .and_then(|c| c.profile.as_ref())
            .map(|p| p.name.clone());

        let timestamp = message
            .timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339();

        // Button taps arrive as interactive replies carrying the button id.
        if message.message_type == "interactive" {
            let reply = message.interactive.and_then(|i| i.button_reply)?;
            return Some(IncomingMessage {
                message_id: message.id.clone(),
                external_id: message.from.clone(),
                user_id: message.from,
                sender_name,
                text: String::new(),
                timestamp,
                provider: Provider::WhatsappCloud,
                callback_query_id: Some(message.id),
                callback_data: Some(reply.id),
                linking_token: None,
                metadata: MessageMetadata {
                    is_group: false,
                    mentioned: true,
                    message_type: MessageType::Callback,
                },
            });
        }

        let (text, message_type) = match message.message_type.as_str() {
            "text" => (message.text.map(|t| t.body), MessageType::Text),
            "image" => (message.image.and_then(|m| m.caption), MessageType::Caption),
            "video" => (message.video.and_then(|m| m.caption), MessageType::Caption),
            "document" => (message.document.and_then(|m| m.caption), MessageType::Caption),
            other => {
                debug!(message_type = other, "unsupported cloud message type");
                (None, MessageType::Text)
            }
        };
        let text = text.unwrap_or_default();
        if text.trim().is_empty() {
            return None;
        }

        Some(IncomingMessage {
            message_id: message.id,
            external_id: message.from.clone(),
            user_id: message.from,
            sender_name,
            text,
            timestamp,
            provider: Provider::WhatsappCloud,
            callback_query_id: None,
            callback_data: None,
            linking_token: None,
            metadata: MessageMetadata {
                is_group: false,
                mentioned: true,
                message_type,
            },
        })
    }

    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError> {
        self.post_message(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": external_id,
            "type": "text",
            "text": { "body": text },
        }))
        .await
    }

    async fn send_buttons(
        &self,
        external_id: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), LembraError> {
        let flat: Vec<&Button> = buttons.iter().flatten().collect();
        if flat.is_empty() || flat.len() > MAX_REPLY_BUTTONS {
            // The orchestrator's text already carries the numbered list.
            return self.send_text(external_id, text).await;
        }

        let reply_buttons: Vec<serde_json::Value> = flat
            .iter()
            .map(|b| {
                serde_json::json!({
                    "type": "reply",
                    "reply": { "id": b.callback_data, "title": b.label },
                })
            })
            .collect();

        self.post_message(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": external_id,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": text },
                "action": { "buttons": reply_buttons },
            },
        }))
        .await
    }

    async fn send_photo(&self, external_id: &str, photo: &PhotoCard) -> Result<(), LembraError> {
        self.post_message(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": external_id,
            "type": "image",
            "image": { "link": photo.url, "caption": photo.caption },
        }))
        .await
    }

    // The Cloud API has no typing indicator; the trait default no-op is
    // the documented behavior.

    async fn mark_read(&self, _external_id: &str, message_id: &str) -> Result<(), LembraError> {
        if let Err(e) = self
            .post_message(serde_json::json!({
                "messaging_product": "whatsapp",
                "status": "read",
                "message_id": message_id,
            }))
            .await
        {
            warn!(error = %e, "mark as read failed");
        }
        Ok(())
    }
}
