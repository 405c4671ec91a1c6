// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serenity gateway task.
//!
//! Connects to the Discord gateway and forwards message events as
//! wire-shaped JSON through the adapter's parse step into an mpsc channel.
//! The consumer (the dispatcher) owns everything after that.

use std::sync::Arc;

use serenity::all::{Context, EventHandler, GatewayIntents, Message, Ready};
use serenity::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use lembra_core::types::IncomingMessage;
use lembra_core::{LembraError, MessagingProvider};

use crate::DiscordChannel;

struct Handler {
    channel: Arc<DiscordChannel>,
    tx: mpsc::Sender<IncomingMessage>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, data_about_bot: Ready) {
        info!(user = %data_about_bot.user.name, "discord gateway ready");
        self.channel.set_bot_user_id(data_about_bot.user.id.to_string());
    }

    async fn message(&self, _ctx: Context, new_message: Message) {
        // Rebuild the wire shape the adapter's parse step understands.
        let payload = serde_json::json!({
            "id": new_message.id.to_string(),
            "channel_id": new_message.channel_id.to_string(),
            "guild_id": new_message.guild_id.map(|g| g.to_string()),
            "author": {
                "id": new_message.author.id.to_string(),
                "username": new_message.author.name,
                "bot": new_message.author.bot,
            },
            "content": new_message.content,
            "timestamp": new_message.timestamp.to_string(),
            "mentions": new_message
                .mentions
                .iter()
                .map(|u| serde_json::json!({
                    "id": u.id.to_string(),
                    "username": u.name,
                    "bot": u.bot,
                }))
                .collect::<Vec<_>>(),
        });

        match self.channel.parse_incoming(&payload) {
            Some(inbound) => {
                if self.tx.send(inbound).await.is_err() {
                    error!("inbound channel closed, dropping discord message");
                }
            }
            None => debug!("discord message gated or irrelevant"),
        }
    }
}

/// Run the Discord gateway until the client stops.
///
/// Parsed inbound messages flow through `tx`; the caller submits them to
/// the dispatcher.
pub async fn run_gateway(
    token: String,
    channel: Arc<DiscordChannel>,
    tx: mpsc::Sender<IncomingMessage>,
) -> Result<(), LembraError> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::Client::builder(&token, intents)
        .event_handler(Handler { channel, tx })
        .await
        .map_err(|e| LembraError::Channel {
            message: format!("discord client build failed: {e}"),
            source: Some(Box::new(e)),
        })?;

    client.start().await.map_err(|e| LembraError::Channel {
        message: format!("discord gateway stopped: {e}"),
        source: Some(Box::new(e)),
    })
}
