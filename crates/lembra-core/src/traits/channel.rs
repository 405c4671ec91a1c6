// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider trait for channel integrations (Telegram, WhatsApp, Discord).
//!
//! Each channel implements one [`MessagingProvider`]: inbound payloads are
//! normalized by `parse_incoming`, authenticity is checked by
//! `verify_webhook`, and outbound delivery goes through a small set of
//! primitives. Primitives a channel cannot support natively are no-ops by
//! default, never errors, so the orchestrator stays channel-agnostic.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::LembraError;
use crate::types::{
    Button, ChannelCapabilities, HealthStatus, IncomingMessage, PhotoCard, Provider, Reply,
};

/// A raw webhook request as seen by the gateway: lowercased header map plus
/// the unmodified body bytes (signature checks need the exact bytes).
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn new(headers: impl IntoIterator<Item = (String, String)>, body: Vec<u8>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            body,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Adapter for one messaging platform.
#[async_trait]
pub trait MessagingProvider: Send + Sync + 'static {
    /// Human-readable adapter name (used in logs and the registry).
    fn name(&self) -> &str;

    /// Which platform this adapter speaks for.
    fn provider(&self) -> Provider;

    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Authenticity check for an inbound webhook.
    ///
    /// Must fail closed: when a secret/signature is configured and the
    /// request lacks a valid one, return `false`. Accept-all is only
    /// permitted in an explicit non-production mode.
    fn verify_webhook(&self, request: &WebhookRequest) -> bool;

    /// Normalize a raw inbound payload into an [`IncomingMessage`].
    ///
    /// Returns `None` for self-sent messages, empty/irrelevant payloads,
    /// and group messages that neither carry a command marker nor mention
    /// the bot (mention gating).
    fn parse_incoming(&self, payload: &serde_json::Value) -> Option<IncomingMessage>;

    /// Send a plain text message to a chat.
    async fn send_text(&self, external_id: &str, text: &str) -> Result<(), LembraError>;

    /// Send a text message with inline buttons (one row per inner slice).
    ///
    /// Channels without button support fall back to the plain text, which
    /// the orchestrator already writes to stand alone.
    async fn send_buttons(
        &self,
        external_id: &str,
        text: &str,
        _buttons: &[Vec<Button>],
    ) -> Result<(), LembraError> {
        self.send_text(external_id, text).await
    }

    /// Send a photo with caption. No-op on channels without photo support.
    async fn send_photo(&self, _external_id: &str, _photo: &PhotoCard) -> Result<(), LembraError> {
        Ok(())
    }

    /// Show a typing indicator. No-op where unsupported.
    async fn send_typing(&self, _external_id: &str) -> Result<(), LembraError> {
        Ok(())
    }

    /// Mark an inbound message as read. No-op where unsupported.
    async fn mark_read(&self, _external_id: &str, _message_id: &str) -> Result<(), LembraError> {
        Ok(())
    }

    /// Acknowledge a callback query so the client stops its spinner.
    /// No-op where unsupported.
    async fn answer_callback(&self, _callback_query_id: &str) -> Result<(), LembraError> {
        Ok(())
    }

    /// Deliver a full [`Reply`], degrading to what the channel supports.
    ///
    /// Photo cards go out first when supported (falling back to their
    /// caption as text), then the reply body with or without buttons.
    async fn deliver(&self, external_id: &str, reply: &Reply) -> Result<(), LembraError> {
        let caps = self.capabilities();

        if let Some(ref photo) = reply.photo {
            if caps.supports_photos {
                self.send_photo(external_id, photo).await?;
            } else if !photo.caption.trim().is_empty() {
                self.send_text(external_id, &photo.caption).await?;
            }
        }

        if reply.text.trim().is_empty() && reply.buttons.is_empty() {
            return Ok(());
        }

        if !reply.buttons.is_empty() && caps.supports_buttons {
            self.send_buttons(external_id, &reply.text, &reply.buttons)
                .await
        } else {
            self.send_text(external_id, &reply.text).await
        }
    }

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, LembraError> {
        Ok(HealthStatus::Healthy)
    }

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), LembraError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_request_header_lookup_is_case_insensitive() {
        let req = WebhookRequest::new(
            [("X-Hub-Signature-256".to_string(), "sha256=abc".to_string())],
            b"{}".to_vec(),
        );
        assert_eq!(req.header("x-hub-signature-256"), Some("sha256=abc"));
        assert_eq!(req.header("X-HUB-SIGNATURE-256"), Some("sha256=abc"));
        assert_eq!(req.header("x-other"), None);
    }

    #[test]
    fn webhook_request_preserves_body_bytes() {
        let body = vec![0u8, 159, 146, 150];
        let req = WebhookRequest::new([], body.clone());
        assert_eq!(req.body, body);
    }
}
