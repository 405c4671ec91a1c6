// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation states and the typed context document.
//!
//! The context is a bounded struct rather than a free-form map, so the
//! transition table gets compile-time exhaustiveness. Updates go through
//! [`ConversationContext::apply`], which merges instead of replacing:
//! fields a patch leaves as `None` keep their prior values. That is what
//! lets batch progress accumulate without re-sending unrelated fields.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use lembra_core::types::{Candidate, ItemType};

/// States of the conversation machine. The stored string forms are stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Initial and terminal state.
    Idle,
    /// A clarification question is pending.
    AwaitingContext,
    /// A candidate list was shown; waiting for a pick.
    AwaitingConfirmation,
    /// A single candidate detail was shown; waiting for yes/retry.
    AwaitingFinalConfirmation,
    /// Working through a queue of save requests one at a time.
    AwaitingBatchItem,
    /// Escape hatch after repeated failed clarifications.
    OffTopicChat,
    /// Transient, mid-enrichment.
    Processing,
    /// Auto-closed; replaced by a fresh conversation on next message.
    Closed,
}

/// One entry in the batch save queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub query: String,
    pub item_type: ItemType,
    pub status: BatchStatus,
}

/// Lifecycle of a batch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Confirmed,
    Skipped,
}

/// The conversation's mutable context document.
///
/// Serialized as JSON into the conversation row and always read, merged,
/// and written back as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationContext {
    /// Query driving the current save/enrichment flow.
    pub pending_query: Option<String>,
    /// Item type resolved for the current flow.
    pub pending_item_type: Option<ItemType>,
    /// Original free text, kept so notes save their full content.
    pub pending_content: Option<String>,
    /// URL captured from the current flow.
    pub pending_url: Option<String>,
    /// Candidate list shown while a confirmation is pending (capped).
    pub candidates: Vec<Candidate>,
    /// The candidate in final confirmation.
    pub selected: Option<Candidate>,
    /// Unresolved clarification rounds so far.
    pub clarification_attempts: u32,
    /// Batch save queue.
    pub batch: Vec<BatchItem>,
    /// Previous user message, for "save the previous thing" references.
    pub last_user_text: Option<String>,
}

/// A partial context update. `None` fields preserve the current value.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub pending_query: Option<String>,
    pub pending_item_type: Option<ItemType>,
    pub pending_content: Option<String>,
    pub pending_url: Option<String>,
    pub candidates: Option<Vec<Candidate>>,
    pub selected: Option<Candidate>,
    pub clarification_attempts: Option<u32>,
    pub batch: Option<Vec<BatchItem>>,
    pub last_user_text: Option<String>,
}

impl ConversationContext {
    /// Deserialize a stored context, falling back to an empty document for
    /// anything unreadable (a context must never brick a conversation).
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Merge a patch: specified fields override, unspecified persist.
    pub fn apply(&mut self, patch: ContextPatch) {
        if let Some(v) = patch.pending_query {
            self.pending_query = Some(v);
        }
        if let Some(v) = patch.pending_item_type {
            self.pending_item_type = Some(v);
        }
        if let Some(v) = patch.pending_content {
            self.pending_content = Some(v);
        }
        if let Some(v) = patch.pending_url {
            self.pending_url = Some(v);
        }
        if let Some(v) = patch.candidates {
            self.candidates = v;
        }
        if let Some(v) = patch.selected {
            self.selected = Some(v);
        }
        if let Some(v) = patch.clarification_attempts {
            self.clarification_attempts = v;
        }
        if let Some(v) = patch.batch {
            self.batch = v;
        }
        if let Some(v) = patch.last_user_text {
            self.last_user_text = Some(v);
        }
    }

    /// Clear the transient flow fields on deny/cancel or completion.
    /// `last_user_text` survives; it is conversation-scoped, not flow-scoped.
    pub fn clear_transient(&mut self) {
        self.pending_query = None;
        self.pending_item_type = None;
        self.pending_content = None;
        self.pending_url = None;
        self.candidates.clear();
        self.selected = None;
        self.clarification_attempts = 0;
        self.batch.clear();
    }

    /// First pending batch entry index, if any.
    pub fn next_pending_batch(&self) -> Option<usize> {
        self.batch.iter().position(|i| i.status == BatchStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_strings_are_stable() {
        assert_eq!(ConversationState::Idle.to_string(), "idle");
        assert_eq!(
            ConversationState::AwaitingFinalConfirmation.to_string(),
            "awaiting_final_confirmation"
        );
        assert_eq!(
            ConversationState::from_str("off_topic_chat").unwrap(),
            ConversationState::OffTopicChat
        );
        assert_eq!(
            ConversationState::from_str("closed").unwrap(),
            ConversationState::Closed
        );
    }

    #[test]
    fn apply_merges_not_replaces() {
        let mut ctx = ConversationContext {
            pending_query: Some("interestelar".to_string()),
            clarification_attempts: 2,
            ..Default::default()
        };
        ctx.apply(ContextPatch {
            pending_item_type: Some(ItemType::Movie),
            ..Default::default()
        });
        // Unspecified fields are preserved.
        assert_eq!(ctx.pending_query.as_deref(), Some("interestelar"));
        assert_eq!(ctx.clarification_attempts, 2);
        assert_eq!(ctx.pending_item_type, Some(ItemType::Movie));
    }

    #[test]
    fn clear_transient_keeps_last_user_text() {
        let mut ctx = ConversationContext {
            pending_query: Some("x".to_string()),
            clarification_attempts: 3,
            last_user_text: Some("anterior".to_string()),
            ..Default::default()
        };
        ctx.clear_transient();
        assert!(ctx.pending_query.is_none());
        assert_eq!(ctx.clarification_attempts, 0);
        assert_eq!(ctx.last_user_text.as_deref(), Some("anterior"));
    }

    #[test]
    fn unreadable_context_falls_back_to_default() {
        let ctx = ConversationContext::from_json("not json at all");
        assert_eq!(ctx, ConversationContext::default());
    }

    #[test]
    fn context_round_trips_through_json() {
        let mut ctx = ConversationContext::default();
        ctx.batch.push(BatchItem {
            query: "akira".to_string(),
            item_type: ItemType::Movie,
            status: BatchStatus::Pending,
        });
        let json = ctx.to_json();
        assert_eq!(ConversationContext::from_json(&json), ctx);
    }

    #[test]
    fn next_pending_batch_skips_resolved() {
        let ctx = ConversationContext {
            batch: vec![
                BatchItem {
                    query: "a".to_string(),
                    item_type: ItemType::Movie,
                    status: BatchStatus::Confirmed,
                },
                BatchItem {
                    query: "b".to_string(),
                    item_type: ItemType::Movie,
                    status: BatchStatus::Pending,
                },
            ],
            ..Default::default()
        };
        assert_eq!(ctx.next_pending_batch(), Some(1));
    }
}
