// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging provider for deterministic testing.
//!
//! Captures every outbound primitive for assertion and lets tests fabricate
//! inbound messages without any wire format.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use lembra_core::types::{
    Button, ChannelCapabilities, IncomingMessage, MessageMetadata, MessageType, PhotoCard,
    Provider,
};
use lembra_core::{LembraError, MessagingProvider, WebhookRequest};

/// One captured outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum SentItem {
    Text {
        external_id: String,
        text: String,
    },
    Buttons {
        external_id: String,
        text: String,
        buttons: Vec<Vec<Button>>,
    },
    Photo {
        external_id: String,
        photo: PhotoCard,
    },
    Typing {
        external_id: String,
    },
    Read {
        external_id: String,
        message_id: String,
    },
    CallbackAnswer {
        callback_query_id: String,
    },
}

/// A mock channel that records everything sent through it.
pub struct MockChannel {
    provider: Provider,
    capabilities: ChannelCapabilities,
    sent: Arc<Mutex<Vec<SentItem>>>,
}

impl MockChannel {
    /// A full-featured mock channel (buttons, photos, the lot).
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            capabilities: ChannelCapabilities {
                supports_buttons: true,
                supports_photos: true,
                supports_typing: true,
                supports_read_receipts: true,
                supports_callbacks: true,
                max_message_length: Some(4096),
            },
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A text-only mock channel, for degradation tests.
    pub fn text_only(provider: Provider) -> Self {
        Self {
            provider,
            capabilities: ChannelCapabilities::text_only(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything sent so far, in order.
    pub async fn sent_items(&self) -> Vec<SentItem> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Texts of all plain/button messages sent, in order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|item| match item {
                SentItem::Text { text, .. } | SentItem::Buttons { text, .. } => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }
}

/// Build a plain inbound text message for tests.
pub fn inbound_text(provider: Provider, user_id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        message_id: uuid::Uuid::new_v4().to_string(),
        external_id: user_id.to_string(),
        user_id: user_id.to_string(),
        sender_name: Some("Teste".to_string()),
        text: text.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        provider,
        callback_query_id: None,
        callback_data: None,
        linking_token: None,
        metadata: MessageMetadata::direct_text(),
    }
}

/// Build an inbound callback (button tap) for tests.
pub fn inbound_callback(provider: Provider, user_id: &str, data: &str) -> IncomingMessage {
    let mut msg = inbound_text(provider, user_id, "");
    msg.callback_query_id = Some(uuid::Uuid::new_v4().to_string());
    msg.callback_data = Some(data.to_string());
    msg.metadata.message_type = MessageType::Callback;
    msg
}

#[async_trait]
impl MessagingProvider for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn capabilities(&self) -> ChannelCapabilities {
        self.capabilities
    }

    fn verify_webhook(&self, _request: &WebhookRequest) -> bool {
        true
    }

    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage> {
        serde_json::from_value(payload.clone()).ok()
    }

    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::Text {
            external_id: external_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_buttons(
        &self,
        external_id: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::Buttons {
            external_id: external_id.to_string(),
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(())
    }

    async fn send_photo(&self, external_id: &str, photo: &PhotoCard) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::Photo {
            external_id: external_id.to_string(),
            photo: photo.clone(),
        });
        Ok(())
    }

    async fn send_typing(&self, external_id: &str) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::Typing {
            external_id: external_id.to_string(),
        });
        Ok(())
    }

    async fn mark_read(&self, external_id: &str, message_id: &str) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::Read {
            external_id: external_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), LembraError> {
        self.sent.lock().await.push(SentItem::CallbackAnswer {
            callback_query_id: callback_query_id.to_string(),
        });
        Ok(())
    }
}
