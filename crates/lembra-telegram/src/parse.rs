// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram webhook payload parsing.
//!
//! Deserializes the Bot API update JSON into a channel-agnostic
//! [`IncomingMessage`]. Group messages pass only when they carry a `/`
//! command or mention the bot (mention gating); self-sent and empty
//! updates return `None`.

use serde::Deserialize;
use tracing::debug;

use lembra_core::types::{
    IncomingMessage, MessageMetadata, MessageType, Provider,
};

#[derive(Debug, Deserialize)]
pub(crate) struct TgUpdate {
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TgChat {
    fn is_group(&self) -> bool {
        matches!(self.chat_type.as_str(), "group" | "supergroup")
    }
}

/// Parse one webhook update into a normalized message.
pub fn parse_update(payload: &serde_json::Value, bot_username: Option<&str>) -> Option<IncomingMessage> {
    let update: TgUpdate = serde_json::from_value(payload.clone()).ok()?;

    if let Some(query) = update.callback_query {
        return parse_callback(query);
    }

    let message = update.message?;
    let sender = message.from.as_ref()?;
    if sender.is_bot {
        debug!(chat_id = message.chat.id, "ignoring self/bot message");
        return None;
    }

    let raw_text = message
        .text
        .clone()
        .or_else(|| message.caption.clone())
        .unwrap_or_default();
    if raw_text.trim().is_empty() {
        return None;
    }
    let message_type = if message.text.is_some() {
        MessageType::Text
    } else {
        MessageType::Caption
    };

    let is_group = message.chat.is_group();
    let mentioned = bot_username
        .map(|username| raw_text.contains(&format!("@{username}")))
        .unwrap_or(false);

    // Mention gating: group messages need a command marker or a mention.
    if is_group && !mentioned && !raw_text.trim_start().starts_with('/') {
        debug!(chat_id = message.chat.id, "group message without mention, gated");
        return None;
    }

    // Strip the mention (also covers "/start@bot" command suffixes).
    let text = match bot_username {
        Some(username) => raw_text.replace(&format!("@{username}"), " "),
        None => raw_text.clone(),
    };
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    // Inline linking token on a start command: "/start <token>".
    let linking_token = text
        .strip_prefix("/start")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Some(IncomingMessage {
        message_id: message.message_id.to_string(),
        external_id: message.chat.id.to_string(),
        user_id: sender.id.to_string(),
        sender_name: Some(
            sender
                .username
                .clone()
                .unwrap_or_else(|| sender.first_name.clone()),
        ),
        text,
        timestamp: chrono::DateTime::from_timestamp(message.date, 0)
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339(),
        provider: Provider::Telegram,
        callback_query_id: None,
        callback_data: None,
        linking_token,
        metadata: MessageMetadata {
            is_group,
            mentioned: mentioned || !is_group,
            message_type,
        },
    })
}

fn parse_callback(query: TgCallbackQuery) -> Option<IncomingMessage> {
    let data = query.data?;
    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat.id.to_string())
        .unwrap_or_else(|| query.from.id.to_string());
    let message_id = query
        .message
        .as_ref()
        .map(|m| format!("cb-{}-{}", m.message_id, query.id))
        .unwrap_or_else(|| format!("cb-{}", query.id));
    let is_group = query
        .message
        .as_ref()
        .map(|m| m.chat.is_group())
        .unwrap_or(false);

    Some(IncomingMessage {
        message_id,
        external_id: chat_id,
        user_id: query.from.id.to_string(),
        sender_name: Some(
            query
                .from
                .username
                .clone()
                .unwrap_or_else(|| query.from.first_name.clone()),
        ),
        text: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        provider: Provider::Telegram,
        callback_query_id: Some(query.id),
        callback_data: Some(data),
        linking_token: None,
        metadata: MessageMetadata {
            is_group,
            mentioned: true,
            message_type: MessageType::Callback,
        },
    })
}
