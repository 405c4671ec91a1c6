// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the messaging, intent, and orchestration layers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Callback data prefix for candidate list selections (`select_0`, `select_1`, ...).
///
/// These literals are part of the wire contract between outbound button
/// payloads and inbound callback parsing. Do not change them.
pub const CALLBACK_SELECT_PREFIX: &str = "select_";

/// Callback data for the final-confirmation "yes" button.
pub const CALLBACK_CONFIRM_FINAL: &str = "confirm_final";

/// Callback data for the final-confirmation "pick another" button.
pub const CALLBACK_CHOOSE_AGAIN: &str = "choose_again";

/// Build the callback data string for a candidate list index.
pub fn select_callback(index: usize) -> String {
    format!("{CALLBACK_SELECT_PREFIX}{index}")
}

/// Parse a `select_N` callback data string back into an index.
pub fn parse_select_callback(data: &str) -> Option<usize> {
    data.strip_prefix(CALLBACK_SELECT_PREFIX)?.parse().ok()
}

/// The messaging platform a message came from or is going to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Telegram,
    WhatsappCloud,
    WhatsappEvolution,
    Discord,
}

/// How the inbound text was carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text message body.
    Text,
    /// Media message; the text came from its caption.
    Caption,
    /// Button tap carried as a callback query.
    Callback,
}

/// Channel-level flags attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Message arrived in a group/guild context rather than a DM.
    pub is_group: bool,
    /// The bot was explicitly mentioned (always true in DMs).
    pub mentioned: bool,
    /// Wire form of the message.
    pub message_type: MessageType,
}

impl MessageMetadata {
    /// Metadata for a plain direct text message.
    pub fn direct_text() -> Self {
        Self {
            is_group: false,
            mentioned: true,
            message_type: MessageType::Text,
        }
    }
}

/// A normalized inbound message, produced by a channel adapter's parse step.
///
/// `external_id` identifies the chat/channel to reply into; `user_id`
/// identifies the sender and differs from `external_id` in groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: String,
    pub external_id: String,
    pub user_id: String,
    pub sender_name: Option<String>,
    pub text: String,
    /// RFC 3339 timestamp from the provider, or receipt time when absent.
    pub timestamp: String,
    pub provider: Provider,
    /// Set when this message is a button tap rather than typed text.
    pub callback_query_id: Option<String>,
    pub callback_data: Option<String>,
    /// Inline token carried on a start/deep-link command, if any.
    pub linking_token: Option<String>,
    pub metadata: MessageMetadata,
}

/// An inline button offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// A photo with caption, for candidate detail views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoCard {
    pub url: String,
    pub caption: String,
}

/// The orchestrator's answer to one inbound message.
///
/// Channels degrade this to what they support: buttons collapse onto the
/// text when unsupported, the photo falls back to its caption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
    pub photo: Option<PhotoCard>,
}

impl Reply {
    /// A plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A reply with one row of buttons per inner vec.
    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            buttons,
            ..Default::default()
        }
    }

    /// True when there is nothing to deliver.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.buttons.is_empty() && self.photo.is_none()
    }
}

/// Kind of memory item the assistant manages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Note,
    Movie,
    TvShow,
    Video,
    Link,
}

impl ItemType {
    /// True for types that have an enrichment lookup (movies, TV, videos).
    pub fn is_enrichable(self) -> bool {
        matches!(self, ItemType::Movie | ItemType::TvShow | ItemType::Video)
    }
}

/// Coarse intent category produced by the classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SaveContent,
    SearchContent,
    DeleteContent,
    Confirmation,
    Denial,
    Settings,
    Info,
    Casual,
    Unknown,
}

/// Fine-grained verb within an intent category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    SaveContent,
    SavePrevious,
    SearchItems,
    DeleteAll,
    DeleteItem,
    DeleteByQuery,
    Confirm,
    Deny,
    GetName,
    UpdateSettings,
    InfoRequest,
    CasualChat,
    Unknown,
}

/// Entities extracted alongside an intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    /// Free-text query or content to act on.
    #[serde(default)]
    pub query: Option<String>,
    /// 1-based selections parsed from numbers/ordinals, deduplicated and ascending.
    #[serde(default)]
    pub selections: Vec<usize>,
    #[serde(default)]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub url: Option<String>,
    /// Named target of a settings update (e.g., the new assistant name).
    #[serde(default)]
    pub target: Option<String>,
}

/// The classifier's verdict for one inbound text. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub action: IntentAction,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    #[serde(default)]
    pub entities: Entities,
}

impl IntentResult {
    /// The fallback verdict when nothing matched.
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            action: IntentAction::Unknown,
            confidence: 0.5,
            entities: Entities::default(),
        }
    }
}

/// An enrichment search result offered to the user for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider-side identifier (TMDB id, YouTube video id).
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub poster_url: Option<String>,
}

/// Capabilities reported by a messaging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapabilities {
    pub supports_buttons: bool,
    pub supports_photos: bool,
    pub supports_typing: bool,
    pub supports_read_receipts: bool,
    pub supports_callbacks: bool,
    pub max_message_length: Option<usize>,
}

impl ChannelCapabilities {
    /// A text-only channel with no rich primitives.
    pub fn text_only() -> Self {
        Self {
            supports_buttons: false,
            supports_photos: false,
            supports_typing: false,
            supports_read_receipts: false,
            supports_callbacks: false,
            max_message_length: None,
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn select_callback_round_trips() {
        assert_eq!(select_callback(0), "select_0");
        assert_eq!(select_callback(6), "select_6");
        assert_eq!(parse_select_callback("select_3"), Some(3));
        assert_eq!(parse_select_callback("select_"), None);
        assert_eq!(parse_select_callback("confirm_final"), None);
    }

    #[test]
    fn provider_string_round_trips() {
        for p in [
            Provider::Telegram,
            Provider::WhatsappCloud,
            Provider::WhatsappEvolution,
            Provider::Discord,
        ] {
            assert_eq!(Provider::from_str(&p.to_string()).unwrap(), p);
        }
        assert_eq!(Provider::Telegram.to_string(), "telegram");
        assert_eq!(Provider::WhatsappCloud.to_string(), "whatsapp_cloud");
    }

    #[test]
    fn item_type_enrichable() {
        assert!(ItemType::Movie.is_enrichable());
        assert!(ItemType::TvShow.is_enrichable());
        assert!(ItemType::Video.is_enrichable());
        assert!(!ItemType::Note.is_enrichable());
        assert!(!ItemType::Link.is_enrichable());
    }

    #[test]
    fn unknown_intent_result_has_midpoint_confidence() {
        let r = IntentResult::unknown();
        assert_eq!(r.intent, Intent::Unknown);
        assert_eq!(r.action, IntentAction::Unknown);
        assert!((r.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_reply_detection() {
        assert!(Reply::default().is_empty());
        assert!(Reply::text("   ").is_empty());
        assert!(!Reply::text("oi").is_empty());
        assert!(!Reply::with_buttons("", vec![vec![Button::new("a", "b")]]).is_empty());
    }
}
