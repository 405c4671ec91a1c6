// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider trait.
//!
//! The orchestrator only ever needs whole completions: the model acts as a
//! classifier or planner, never as a streaming chat surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::LembraError;

/// Role of one turn in conversation history handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior turn of conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A text-completion backend (AI Gateway, Gemini, Anthropic, ...).
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Complete `prompt` given optional prior `history`, returning the raw
    /// model text. Callers own all parsing and never show this text to end
    /// users unvalidated.
    async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LembraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_turn_constructors_set_roles() {
        assert_eq!(ChatTurn::user("oi").role, ChatRole::User);
        assert_eq!(ChatTurn::assistant("olá").role, ChatRole::Assistant);
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
    }
}
