// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits implemented by channel, LLM, enrichment, and storage
//! backends.

pub mod channel;
pub mod enrichment;
pub mod llm;
pub mod storage;

pub use channel::{MessagingProvider, WebhookRequest};
pub use enrichment::EnrichmentProvider;
pub use llm::{ChatRole, ChatTurn, LlmProvider};
pub use storage::{
    ConversationRecord, MemoryItemRecord, MessageRecord, QueueEntry, StorageAdapter, UserRecord,
};
