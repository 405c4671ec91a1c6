// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait and persisted record types.
//!
//! The conversation record is the only mutable shared resource in the core:
//! it is always read, merged, and written back as a unit by the caller.
//! Messages are append-only. The queue gives crash-safe, per-user-partition
//! delivery for inbound webhooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LembraError;
use crate::types::ItemType;

/// One logical dialogue session. At most one row per user has
/// `is_active = true` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub user_id: String,
    /// Stored string form of the conversation state enum.
    pub state: String,
    /// Serialized conversation context document, merged on every update.
    pub context: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only transcript entry. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub provider: Option<String>,
    /// Chat/channel id on the provider side.
    pub external_id: Option<String>,
    /// Provider-assigned message id, used for idempotent ingestion.
    pub provider_message_id: Option<String>,
    /// Raw provider payload for correlation/debugging.
    pub provider_payload: Option<String>,
    pub created_at: String,
}

/// A saved memory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItemRecord {
    pub id: String,
    pub user_id: String,
    pub item_type: ItemType,
    pub title: String,
    pub content: Option<String>,
    pub url: Option<String>,
    /// Serialized enrichment metadata (year, overview, genres, poster).
    pub metadata: Option<String>,
    pub created_at: String,
}

/// Per-user settings and moderation bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub assistant_name: Option<String>,
    pub offense_count: i64,
    /// RFC 3339 instant until which the user is timed out, if any.
    pub timeout_until: Option<String>,
}

/// One entry in the durable inbound queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    /// Per-user partition key; entries within a partition are processed in order.
    pub partition: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Persistence backend for conversations, transcripts, memory, and the queue.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    // --- Conversations ---

    /// The user's single active conversation, if one exists.
    async fn active_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationRecord>, LembraError>;

    /// Fetch a conversation by id.
    async fn conversation(&self, id: &str) -> Result<Option<ConversationRecord>, LembraError>;

    /// Create a fresh active conversation, transactionally deactivating any
    /// prior active conversations for the user.
    async fn create_conversation(&self, user_id: &str)
        -> Result<ConversationRecord, LembraError>;

    /// Persist a conversation's state and context as a unit.
    async fn update_conversation(
        &self,
        id: &str,
        state: &str,
        context: &str,
    ) -> Result<(), LembraError>;

    /// Mark a conversation closed and inactive.
    async fn close_conversation(&self, id: &str) -> Result<(), LembraError>;

    // --- Transcript ---

    /// Append a transcript entry. Returns `false` when the entry was
    /// deduplicated against an existing provider message id.
    async fn append_message(&self, record: &MessageRecord) -> Result<bool, LembraError>;

    /// Most recent transcript entries for a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, LembraError>;

    // --- Memory items ---

    async fn insert_memory_item(&self, item: &MemoryItemRecord) -> Result<(), LembraError>;

    /// Case-insensitive exact-title lookup for duplicate detection.
    async fn find_memory_by_title(
        &self,
        user_id: &str,
        item_type: ItemType,
        title: &str,
    ) -> Result<Option<MemoryItemRecord>, LembraError>;

    /// Ranked substring search over titles and content.
    async fn search_memory(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItemRecord>, LembraError>;

    /// Most recent items for a user, newest first.
    async fn list_memory(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItemRecord>, LembraError>;

    /// Delete one item. Returns `false` when it did not exist.
    async fn delete_memory(&self, user_id: &str, item_id: &str) -> Result<bool, LembraError>;

    /// Delete every item for a user, returning the count removed.
    async fn delete_all_memory(&self, user_id: &str) -> Result<u64, LembraError>;

    /// Delete items matching a query, returning the count removed.
    async fn delete_memory_by_query(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<u64, LembraError>;

    // --- Users ---

    /// Fetch or create the user's settings row.
    async fn user(&self, user_id: &str) -> Result<UserRecord, LembraError>;

    async fn set_assistant_name(&self, user_id: &str, name: &str) -> Result<(), LembraError>;

    /// Increment the user's offense count and set the timeout window.
    /// Returns the new count.
    async fn record_offense(
        &self,
        user_id: &str,
        timeout_until: &str,
    ) -> Result<i64, LembraError>;

    // --- Durable inbound queue ---

    /// Enqueue a payload into a per-user partition. Returns the entry id.
    async fn enqueue(&self, partition: &str, payload: &str) -> Result<i64, LembraError>;

    /// Atomically claim the oldest pending entry in a partition.
    async fn dequeue(&self, partition: &str) -> Result<Option<QueueEntry>, LembraError>;

    /// Acknowledge successful processing.
    async fn ack(&self, entry_id: i64) -> Result<(), LembraError>;

    /// Record a processing failure; retries until attempts are exhausted.
    async fn fail(&self, entry_id: i64) -> Result<(), LembraError>;

    /// Partitions that still have pending entries (crash recovery).
    async fn pending_partitions(&self) -> Result<Vec<String>, LembraError>;

    /// Flush and close the backend.
    async fn close(&self) -> Result<(), LembraError>;
}
